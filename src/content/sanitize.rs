/// Typographic characters with an ASCII stand-in. Anything else outside
/// ASCII is dropped.
const REPLACEMENTS: &[(char, &str)] = &[
    ('\u{201c}', "\""), // “
    ('\u{201d}', "\""), // ”
    ('\u{2018}', "'"),  // ‘
    ('\u{2019}', "'"),  // ’
    ('\u{2014}', "-"),  // —
    ('\u{2013}', "-"),  // –
];

fn replacement(c: char) -> &'static str {
    REPLACEMENTS
        .iter()
        .find(|(from, _)| *from == c)
        .map(|(_, to)| *to)
        .unwrap_or("")
}

/// Reduce `text` to ASCII. Lossy and total.
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            out.push_str(replacement(c));
        }
    }
    out
}
