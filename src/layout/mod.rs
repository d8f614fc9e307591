//! Layout Correction
//!
//! Text typed while the host has a Cyrillic (ЙЦУКЕН) layout selected is
//! rewritten to the characters a US QWERTY layout produces on the same
//! physical keys, so the keystroke synthesizer only ever has to emit Latin
//! key identities.
//!
//! Alongside the corrected text, [`correct`] reports every position where
//! the input switches between Cyrillic and everything else. Those are the
//! places a real user would have pressed the OS layout-switch hotkey, and
//! the scheduler replays that hotkey before the character at each one.
//!
//! ```text
//! "aб"  ──correct──>  text: "a,"   boundaries: [1]
//! ```
//!
//! Substitution is one character for one character, so an index into the
//! original input is also an index into the corrected text.

/// Result of a layout correction pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Correction {
    /// Text with every Cyrillic character replaced by its QWERTY counterpart
    pub text: String,
    /// Ascending character indices where script classification changes
    pub boundaries: Vec<usize>,
}

impl Correction {
    /// Corrected text as characters, ready to become a job
    pub fn chars(&self) -> Vec<char> {
        self.text.chars().collect()
    }
}

/// Numero sign, classified as Cyrillic because it lives on the `3` key of
/// the Russian layout.
const NUMERO_SIGN: char = '№';

/// Whether `ch` belongs to the Cyrillic script as seen by the layout table.
pub fn is_foreign(ch: char) -> bool {
    matches!(ch, 'А'..='я' | 'Ё' | 'ё') || ch == NUMERO_SIGN
}

/// QWERTY character on the same physical key as a lowercase ЙЦУКЕН letter.
fn qwerty_for_lower(ch: char) -> Option<char> {
    let mapped = match ch {
        'ё' => '`',
        'й' => 'q',
        'ц' => 'w',
        'у' => 'e',
        'к' => 'r',
        'е' => 't',
        'н' => 'y',
        'г' => 'u',
        'ш' => 'i',
        'щ' => 'o',
        'з' => 'p',
        'х' => '[',
        'ъ' => ']',
        'ф' => 'a',
        'ы' => 's',
        'в' => 'd',
        'а' => 'f',
        'п' => 'g',
        'р' => 'h',
        'о' => 'j',
        'л' => 'k',
        'д' => 'l',
        'ж' => ';',
        'э' => '\'',
        'я' => 'z',
        'ч' => 'x',
        'с' => 'c',
        'м' => 'v',
        'и' => 'b',
        'т' => 'n',
        'ь' => 'm',
        'б' => ',',
        'ю' => '.',
        NUMERO_SIGN => '#',
        _ => return None,
    };
    Some(mapped)
}

/// Substitute a single character.
///
/// Uppercase Cyrillic letters map to the uppercase of their lowercase
/// counterpart when that is a letter. Punctuation targets keep their
/// unshifted form, except `Ё`, which maps to the shifted backquote `~`.
/// Characters outside the table pass through unchanged.
pub fn transliterate(ch: char) -> char {
    if let Some(mapped) = qwerty_for_lower(ch) {
        return mapped;
    }

    let mut lower = ch.to_lowercase();
    let lowered = match (lower.next(), lower.next()) {
        (Some(single), None) => single,
        _ => return ch,
    };

    match qwerty_for_lower(lowered) {
        Some(mapped) if mapped.is_ascii_lowercase() => mapped.to_ascii_uppercase(),
        Some(_) if ch == 'Ё' => '~',
        Some(mapped) => mapped,
        None => ch,
    }
}

/// Indices in `input` where script classification differs from the
/// previous character. The first character never produces a boundary.
pub fn boundaries(input: &str) -> Vec<usize> {
    let mut out = Vec::new();
    let mut prev: Option<bool> = None;

    for (index, ch) in input.chars().enumerate() {
        let cur = is_foreign(ch);
        if let Some(before) = prev {
            if before != cur {
                out.push(index);
            }
        }
        prev = Some(cur);
    }

    out
}

/// Correct `input` and compute its layout boundaries.
pub fn correct(input: &str) -> Correction {
    let text = input
        .chars()
        .map(|ch| if is_foreign(ch) { transliterate(ch) } else { ch })
        .collect();

    Correction {
        text,
        boundaries: boundaries(input),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_input() {
        let correction = correct("");
        assert!(correction.text.is_empty());
        assert!(correction.boundaries.is_empty());
    }

    #[test]
    fn test_mixed_script() {
        let correction = correct("aб");
        assert_eq!(correction.text, "a,");
        assert_eq!(correction.boundaries, vec![1]);
    }

    #[test]
    fn test_full_word() {
        // "привет" typed on the Russian layout
        assert_eq!(correct("привет").text, "ghbdtn");
        assert_eq!(correct("Привет").text, "Ghbdtn");
        assert!(correct("привет").boundaries.is_empty());
    }

    #[test]
    fn test_uppercase_punctuation_keys() {
        assert_eq!(transliterate('Х'), '[');
        assert_eq!(transliterate('Ж'), ';');
        assert_eq!(transliterate('Б'), ',');
        assert_eq!(transliterate('Ю'), '.');
        assert_eq!(transliterate('Э'), '\'');
    }

    #[test]
    fn test_yo_exception() {
        assert_eq!(transliterate('ё'), '`');
        assert_eq!(transliterate('Ё'), '~');
    }

    #[test]
    fn test_numero_sign() {
        assert!(is_foreign('№'));
        assert_eq!(transliterate('№'), '#');
    }

    #[test]
    fn test_unmapped_passthrough() {
        assert_eq!(transliterate('x'), 'x');
        assert_eq!(transliterate('€'), '€');
        // Ukrainian letters sit outside the table and the classified range
        assert!(!is_foreign('ї'));
        assert_eq!(correct("ї").text, "ї");
    }

    #[test]
    fn test_boundaries_multiple_switches() {
        // native, foreign, foreign, native, foreign
        assert_eq!(boundaries("aбвgд"), vec![1, 3, 4]);
        assert_eq!(boundaries("бa"), vec![1]);
        assert_eq!(boundaries("ab cd"), Vec::<usize>::new());
    }

    proptest! {
        #[test]
        fn prop_native_input_is_identity(input in "[ -~]{0,64}") {
            let correction = correct(&input);
            prop_assert_eq!(&correction.text, &input);
            prop_assert!(correction.boundaries.is_empty());
        }

        #[test]
        fn prop_length_preserved(input in "\\PC{0,64}") {
            let correction = correct(&input);
            prop_assert_eq!(correction.text.chars().count(), input.chars().count());
        }

        #[test]
        fn prop_boundaries_strictly_increasing(input in "[a-zа-яё ,.]{0,64}") {
            let found = boundaries(&input);
            prop_assert!(found.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(found.iter().all(|&i| i > 0 && i < input.chars().count()));
        }

        #[test]
        fn prop_alternating_script(n in 1usize..40) {
            let input: String = (0..n).map(|i| if i % 2 == 0 { 'a' } else { 'я' }).collect();
            prop_assert_eq!(boundaries(&input).len(), n - 1);
        }

        #[test]
        fn prop_foreign_letters_map_case_insensitively(ch in "[а-яё]") {
            let lower = ch.chars().next().unwrap();
            let upper = lower.to_uppercase().next().unwrap();
            let lower_mapped = transliterate(lower);
            let upper_mapped = transliterate(upper);
            if lower_mapped.is_ascii_lowercase() {
                prop_assert_eq!(upper_mapped, lower_mapped.to_ascii_uppercase());
            } else if upper != 'Ё' {
                prop_assert_eq!(upper_mapped, lower_mapped);
            }
        }
    }
}
