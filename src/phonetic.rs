//! # Phonetic Keys
//!
//! Metaphone encoding of medicine names. Spelling variants that sound alike
//! (`paracetamol` / `paracetmol`, `cefalexin` / `cephalexin`) share a key.
//! Each alphabetic word is encoded separately and the keys are concatenated.

fn is_vowel(c: char) -> bool {
    matches!(c, 'A' | 'E' | 'I' | 'O' | 'U')
}

fn is_front_vowel(c: char) -> bool {
    matches!(c, 'E' | 'I' | 'Y')
}

fn encode_word(word: &[char], key: &mut String) {
    let len = word.len();
    if len == 0 {
        return;
    }

    let at = |i: usize| -> Option<char> { word.get(i).copied() };

    let mut start = 0;
    match (word[0], at(1)) {
        ('A', Some('E')) => {
            key.push('E');
            start = 2;
        }
        ('G', Some('N')) | ('K', Some('N')) | ('P', Some('N')) | ('W', Some('R')) => {
            start = 1;
        }
        ('X', _) => {
            key.push('S');
            start = 1;
        }
        ('W', Some('H')) => {
            key.push('W');
            start = 2;
        }
        _ => {}
    }

    let mut i = start;
    while i < len {
        let c = word[i];
        let prev = if i > 0 { at(i - 1) } else { None };
        let next = at(i + 1);
        let after_next = at(i + 2);

        // doubled letters collapse, except C
        if prev == Some(c) && c != 'C' {
            i += 1;
            continue;
        }

        match c {
            'A' | 'E' | 'I' | 'O' | 'U' => {
                if i == 0 {
                    key.push(c);
                }
            }
            'B' => {
                if !(prev == Some('M') && i + 1 == len) {
                    key.push('B');
                }
            }
            'C' => {
                if next == Some('I') && after_next == Some('A') {
                    key.push('X');
                } else if next == Some('H') {
                    key.push(if prev == Some('S') { 'K' } else { 'X' });
                    i += 1;
                } else if next.is_some_and(is_front_vowel) {
                    if prev != Some('S') {
                        key.push('S');
                    }
                } else {
                    key.push('K');
                }
            }
            'D' => {
                if next == Some('G') && after_next.is_some_and(is_front_vowel) {
                    key.push('J');
                    i += 1;
                } else {
                    key.push('T');
                }
            }
            'G' => {
                if next == Some('H') {
                    if after_next.is_some_and(is_vowel) {
                        key.push('K');
                    }
                    i += 1;
                } else if next == Some('N')
                    && (i + 2 == len || (after_next == Some('E') && at(i + 3) == Some('D') && i + 4 == len))
                {
                    // silent in -GN and -GNED
                } else if next.is_some_and(is_front_vowel) && prev != Some('G') {
                    key.push('J');
                } else {
                    key.push('K');
                }
            }
            'H' => {
                let after_vowel = prev.is_some_and(is_vowel);
                let before_vowel = next.is_some_and(is_vowel);
                if !after_vowel || before_vowel {
                    key.push('H');
                }
            }
            'K' => {
                if prev != Some('C') {
                    key.push('K');
                }
            }
            'P' => {
                if next == Some('H') {
                    key.push('F');
                    i += 1;
                } else {
                    key.push('P');
                }
            }
            'Q' => key.push('K'),
            'S' => {
                if next == Some('H') {
                    key.push('X');
                    i += 1;
                } else if next == Some('I') && matches!(after_next, Some('O') | Some('A')) {
                    key.push('X');
                } else {
                    key.push('S');
                }
            }
            'T' => {
                if next == Some('I') && matches!(after_next, Some('O') | Some('A')) {
                    key.push('X');
                } else if next == Some('H') {
                    key.push('0');
                    i += 1;
                } else if !(next == Some('C') && after_next == Some('H')) {
                    key.push('T');
                }
            }
            'V' => key.push('F'),
            'W' | 'Y' => {
                if next.is_some_and(is_vowel) {
                    key.push(c);
                }
            }
            'X' => key.push_str("KS"),
            'Z' => key.push('S'),
            other => key.push(other),
        }

        i += 1;
    }
}

/// Metaphone key of a name; names without ASCII letters yield an empty key
///
/// ```rust
/// use prescription_validator::phonetic::metaphone;
///
/// assert_eq!(metaphone("paracetamol"), metaphone("paracetmol"));
/// assert_eq!(metaphone("cephalexin"), metaphone("cefalexin"));
/// ```
pub fn metaphone(name: &str) -> String {
    let mut key = String::new();
    for word in name.split(|c: char| !c.is_ascii_alphabetic()) {
        let letters: Vec<char> = word.chars().map(|c| c.to_ascii_uppercase()).collect();
        encode_word(&letters, &mut key);
    }
    key
}
