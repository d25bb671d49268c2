use crate::timing::WordTiming;

const TRIM_CHARS: &[char] = &[
    '.', ',', '!', '?', ';', ':', '\'', '"', '(', ')', '[', ']', '{', '}',
];

/// Lowercase a word and strip surrounding punctuation.
pub fn clean_word(word: &str) -> String {
    word.trim().trim_matches(TRIM_CHARS).to_lowercase()
}

/// Find `keyword` in `timings`, scanning from `start_from`.
///
/// Single words are matched exactly first, then by containment in either
/// direction, then by a near-prefix rule for simple inflections. Phrases
/// must match word for word; failing that, their first word is matched
/// exactly.
pub fn locate_keyword(timings: &[WordTiming], keyword: &str, start_from: usize) -> Option<usize> {
    let tokens: Vec<String> = clean_word(keyword)
        .split_whitespace()
        .map(clean_word)
        .filter(|t| !t.is_empty())
        .collect();

    if tokens.is_empty() || timings.is_empty() || start_from >= timings.len() {
        return None;
    }

    let cleaned: Vec<String> = timings.iter().map(|t| clean_word(&t.word)).collect();

    if tokens.len() == 1 {
        let token = tokens[0].as_str();
        return find_tier(&cleaned, start_from, |w| w == token)
            .or_else(|| {
                find_tier(&cleaned, start_from, |w| {
                    !w.is_empty() && (w.contains(token) || token.contains(w))
                })
            })
            .or_else(|| find_tier(&cleaned, start_from, |w| near_prefix(w, token)));
    }

    let n = tokens.len();
    if cleaned.len() >= start_from + n {
        for i in start_from..=cleaned.len() - n {
            if cleaned[i..i + n].iter().zip(&tokens).all(|(w, t)| w == t) {
                return Some(i);
            }
        }
    }

    let first = tokens[0].as_str();
    find_tier(&cleaned, start_from, |w| w == first)
}

/// Like [`locate_keyword`], retrying from the beginning when a search from
/// a later position misses.
pub fn locate_keyword_from(
    timings: &[WordTiming],
    keyword: &str,
    start_from: usize,
) -> Option<usize> {
    locate_keyword(timings, keyword, start_from).or_else(|| {
        if start_from > 0 {
            locate_keyword(timings, keyword, 0)
        } else {
            None
        }
    })
}

fn find_tier<F>(cleaned: &[String], start_from: usize, matches: F) -> Option<usize>
where
    F: Fn(&str) -> bool,
{
    cleaned[start_from..]
        .iter()
        .position(|w| matches(w))
        .map(|pos| start_from + pos)
}

/// One word is the other with its last character dropped, as a prefix.
fn near_prefix(a: &str, b: &str) -> bool {
    if a.chars().count() <= 3 || b.chars().count() <= 3 {
        return false;
    }
    let stem = |s: &str| {
        let mut chars = s.chars();
        chars.next_back();
        chars.as_str().to_string()
    };
    a.starts_with(&stem(b)) || b.starts_with(&stem(a))
}
