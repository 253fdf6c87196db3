//! Arabic-script contextual shaping into Unicode presentation forms.
//!
//! Report fonts are drawn one glyph per character with no OpenType layout,
//! so each joining letter is replaced by its isolated, final, initial or
//! medial presentation form before bidi reordering. Lam followed by alef
//! becomes the mandatory ligature.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Joining {
    Dual,
    Right,
    /// Tatweel and ZWJ: join on both sides without a form of their own.
    Causing,
    /// Marks, skipped when looking for neighbours.
    Transparent,
    None,
}

/// (letter, isolated form, dual-joining). The final form follows the
/// isolated one; dual-joining letters continue with initial and medial.
const LETTERS: &[(char, u32, bool)] = &[
    ('\u{0622}', 0xFE81, false), // alef with madda
    ('\u{0623}', 0xFE83, false), // alef with hamza above
    ('\u{0624}', 0xFE85, false), // waw with hamza
    ('\u{0625}', 0xFE87, false), // alef with hamza below
    ('\u{0626}', 0xFE89, true),  // yeh with hamza
    ('\u{0627}', 0xFE8D, false), // alef
    ('\u{0628}', 0xFE8F, true),  // beh
    ('\u{0629}', 0xFE93, false), // teh marbuta
    ('\u{062A}', 0xFE95, true),  // teh
    ('\u{062B}', 0xFE99, true),  // theh
    ('\u{062C}', 0xFE9D, true),  // jeem
    ('\u{062D}', 0xFEA1, true),  // hah
    ('\u{062E}', 0xFEA5, true),  // khah
    ('\u{062F}', 0xFEA9, false), // dal
    ('\u{0630}', 0xFEAB, false), // thal
    ('\u{0631}', 0xFEAD, false), // reh
    ('\u{0632}', 0xFEAF, false), // zain
    ('\u{0633}', 0xFEB1, true),  // seen
    ('\u{0634}', 0xFEB5, true),  // sheen
    ('\u{0635}', 0xFEB9, true),  // sad
    ('\u{0636}', 0xFEBD, true),  // dad
    ('\u{0637}', 0xFEC1, true),  // tah
    ('\u{0638}', 0xFEC5, true),  // zah
    ('\u{0639}', 0xFEC9, true),  // ain
    ('\u{063A}', 0xFECD, true),  // ghain
    ('\u{0641}', 0xFED1, true),  // feh
    ('\u{0642}', 0xFED5, true),  // qaf
    ('\u{0643}', 0xFED9, true),  // kaf
    ('\u{0644}', 0xFEDD, true),  // lam
    ('\u{0645}', 0xFEE1, true),  // meem
    ('\u{0646}', 0xFEE5, true),  // noon
    ('\u{0647}', 0xFEE9, true),  // heh
    ('\u{0648}', 0xFEED, false), // waw
    ('\u{0649}', 0xFEEF, false), // alef maksura
    ('\u{064A}', 0xFEF1, true),  // yeh
    // Persian and Urdu
    ('\u{0671}', 0xFB50, false), // alef wasla
    ('\u{0679}', 0xFB66, true),  // tteh
    ('\u{067E}', 0xFB56, true),  // peh
    ('\u{0686}', 0xFB7A, true),  // tcheh
    ('\u{0688}', 0xFB88, false), // ddal
    ('\u{0691}', 0xFB8C, false), // rreh
    ('\u{0698}', 0xFB8A, false), // jeh
    ('\u{06A9}', 0xFB8E, true),  // keheh
    ('\u{06AF}', 0xFB92, true),  // gaf
    ('\u{06BE}', 0xFBAA, true),  // heh doachashmee
    ('\u{06C1}', 0xFBA6, true),  // heh goal
    ('\u{06CC}', 0xFBFC, true),  // farsi yeh
    ('\u{06D2}', 0xFBAE, false), // yeh barree
];

const LAM: char = '\u{0644}';

/// Isolated lam-alef ligature for each alef variant; the final form follows.
fn lam_alef(alef: char) -> Option<u32> {
    match alef {
        '\u{0622}' => Some(0xFEF5),
        '\u{0623}' => Some(0xFEF7),
        '\u{0625}' => Some(0xFEF9),
        '\u{0627}' => Some(0xFEFB),
        _ => None,
    }
}

fn letter(c: char) -> Option<(u32, bool)> {
    LETTERS
        .iter()
        .find(|(l, _, _)| *l == c)
        .map(|(_, isolated, dual)| (*isolated, *dual))
}

fn is_transparent(c: char) -> bool {
    matches!(c as u32,
        0x0610..=0x061A | 0x064B..=0x065F | 0x0670
        | 0x06D6..=0x06DC | 0x06DF..=0x06E4 | 0x06E7..=0x06E8 | 0x06EA..=0x06ED
    )
}

fn joining_of(c: char) -> Joining {
    match letter(c) {
        Some((_, true)) => Joining::Dual,
        Some((_, false)) => Joining::Right,
        None if c == '\u{0640}' || c == '\u{200D}' => Joining::Causing,
        None if is_transparent(c) => Joining::Transparent,
        None => Joining::None,
    }
}

fn form(isolated: u32, offset: u32, original: char) -> char {
    char::from_u32(isolated + offset).unwrap_or(original)
}

/// Replace Arabic-script letters with their contextual presentation forms.
/// Text without such letters is returned unchanged. ZWNJ is kept and breaks
/// joining; ZWJ forces it.
pub fn shape_arabic(text: &str) -> String {
    if !text.chars().any(|c| letter(c).is_some()) {
        return text.to_string();
    }

    let chars: Vec<char> = text.chars().collect();
    let joining: Vec<Joining> = chars.iter().map(|c| joining_of(*c)).collect();
    let prev_joining = |i: usize| {
        joining[..i]
            .iter()
            .rev()
            .copied()
            .find(|j| *j != Joining::Transparent)
    };
    let next_index = |i: usize| {
        (i + 1..chars.len()).find(|&k| joining[k] != Joining::Transparent)
    };

    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let Some((isolated, dual)) = letter(c) else {
            out.push(c);
            i += 1;
            continue;
        };
        let joins_prev = matches!(prev_joining(i), Some(Joining::Dual | Joining::Causing));
        let next = next_index(i);

        if c == LAM {
            if let Some((n, ligature)) = next.and_then(|n| lam_alef(chars[n]).map(|l| (n, l))) {
                out.push(form(ligature, u32::from(joins_prev), c));
                out.extend(&chars[i + 1..n]);
                i = n + 1;
                continue;
            }
        }

        let joins_next = dual
            && next.is_some_and(|n| {
                matches!(joining[n], Joining::Dual | Joining::Right | Joining::Causing)
            });
        let offset = match (joins_prev, joins_next) {
            (false, false) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (true, true) => 3,
        };
        out.push(form(isolated, offset, c));
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin_text_is_untouched() {
        assert_eq!(shape_arabic("Headache (severe)"), "Headache (severe)");
        assert_eq!(shape_arabic("כאב ראש"), "כאב ראש");
    }

    #[test]
    fn word_takes_contextual_forms() {
        // sad initial, dal final, alef isolated, ain isolated
        assert_eq!(shape_arabic("صداع"), "\u{FEBB}\u{FEAA}\u{FE8D}\u{FEC9}");
    }

    #[test]
    fn medial_forms_between_dual_joiners() {
        // beh initial, yeh medial, noon final
        assert_eq!(shape_arabic("بين"), "\u{FE91}\u{FEF4}\u{FEE6}");
    }

    #[test]
    fn lam_alef_becomes_ligature() {
        assert_eq!(shape_arabic("لا"), "\u{FEFB}");
        // seen initial, lam-alef final, meem isolated
        assert_eq!(shape_arabic("سلام"), "\u{FEB3}\u{FEFC}\u{FEE1}");
    }

    #[test]
    fn marks_are_transparent_to_joining() {
        // beh + fatha, beh: the mark sits between two joined letters
        assert_eq!(shape_arabic("ب\u{064E}ب"), "\u{FE91}\u{064E}\u{FE90}");
    }

    #[test]
    fn zwnj_breaks_joining_in_persian() {
        let shaped = shape_arabic("می\u{200C}کند");
        assert_eq!(shaped, "\u{FEE3}\u{FBFD}\u{200C}\u{FB90}\u{FEE8}\u{FEAA}");
    }

    #[test]
    fn words_shape_independently() {
        assert_eq!(
            shape_arabic("صداع شديد"),
            "\u{FEBB}\u{FEAA}\u{FE8D}\u{FEC9} \u{FEB7}\u{FEAA}\u{FEF3}\u{FEAA}"
        );
    }
}
