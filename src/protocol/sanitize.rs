//! Field sanitization and ASCII transliteration.
//!
//! SIP2 gives `|` and `\r` structural meaning and the wire is 7-bit ASCII,
//! so untrusted values are scrubbed in two stages: [`sanitize`] removes the
//! protocol-reserved bytes when a value enters a frame, and [`to_ascii`]
//! folds whatever non-ASCII survives down to its closest ASCII form at the
//! write boundary.

/// Removes protocol-reserved bytes from a field value.
///
/// Strips `|`, `\r`, `\n`, and every control character in 0x00–0x1F. The
/// function is pure and idempotent; bytes at or above 0x20 other than `|`
/// pass through untouched.
#[must_use]
pub fn sanitize(input: &str) -> String {
    input
        .chars()
        .filter(|&c| c != '|' && c >= '\u{20}')
        .collect()
}

/// Transliterates a frame to 7-bit ASCII.
///
/// Applied to the complete frame immediately before the socket write. ASCII
/// passes through; Latin letters with diacritics fold to their base form;
/// anything else becomes `?`.
#[must_use]
pub fn to_ascii(frame: &str) -> String {
    let mut out = String::with_capacity(frame.len());
    for c in frame.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            out.push_str(fold(c));
        }
    }
    out
}

/// Closest-ASCII fold for the characters that actually show up in patron
/// and title data: Latin-1 Supplement, the common Latin Extended-A letters,
/// and typographic punctuation.
fn fold(c: char) -> &'static str {
    match c {
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' | 'Ā' | 'Ă' | 'Ą' => "A",
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'Æ' => "AE",
        'æ' => "ae",
        'Ç' | 'Ć' | 'Č' => "C",
        'ç' | 'ć' | 'č' => "c",
        'Ð' | 'Ď' => "D",
        'ð' | 'ď' => "d",
        'È' | 'É' | 'Ê' | 'Ë' | 'Ē' | 'Ė' | 'Ę' | 'Ě' => "E",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => "e",
        'Ğ' => "G",
        'ğ' => "g",
        'Ì' | 'Í' | 'Î' | 'Ï' | 'Ī' | 'İ' => "I",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'ı' => "i",
        'Ł' => "L",
        'ł' => "l",
        'Ñ' | 'Ń' | 'Ň' => "N",
        'ñ' | 'ń' | 'ň' => "n",
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' | 'Ō' | 'Ő' => "O",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'Œ' => "OE",
        'œ' => "oe",
        'Ŕ' | 'Ř' => "R",
        'ŕ' | 'ř' => "r",
        'Ś' | 'Ş' | 'Š' => "S",
        'ś' | 'ş' | 'š' => "s",
        'ß' => "ss",
        'Ť' | 'Ţ' => "T",
        'ť' | 'ţ' => "t",
        'Þ' => "Th",
        'þ' => "th",
        'Ù' | 'Ú' | 'Û' | 'Ü' | 'Ū' | 'Ů' | 'Ű' => "U",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => "u",
        'Ý' => "Y",
        'ý' | 'ÿ' => "y",
        'Ź' | 'Ż' | 'Ž' => "Z",
        'ź' | 'ż' | 'ž' => "z",
        '\u{2018}' | '\u{2019}' => "'",
        '\u{201C}' | '\u{201D}' => "\"",
        '\u{2013}' | '\u{2014}' => "-",
        '\u{00A0}' => " ",
        _ => "?",
    }
}
