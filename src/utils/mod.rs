/// Reduces a media title to an ASCII-only file stem, the way the extraction
/// backend does with restricted filenames enabled.
pub fn sanitize_filename(title: &str) -> String {
    let chars: Vec<char> = title.chars().collect();
    let mut result = String::with_capacity(title.len());

    for (i, &c) in chars.iter().enumerate() {
        if let Some(ascii) = transliterate(c) {
            result.push_str(ascii);
            continue;
        }

        match c {
            '?' | '"' => {}
            c if c.is_control() => {}
            // timestamps like 12:34 keep their digits together
            ':' if is_digit_at(&chars, i.wrapping_sub(1)) && is_digit_at(&chars, i + 1) => {
                result.push('_')
            }
            ':' => result.push_str("_-"),
            '\\' | '/' | '|' | '*' | '<' | '>' => result.push('_'),
            '!' | '&' | '\'' | '(' | ')' | '[' | ']' | '{' | '}' | '$' | ';' | '`' | '^' | ','
            | '#' => result.push('_'),
            '\u{0300}'..='\u{036f}' => {}
            c if c.is_whitespace() || !c.is_ascii() => result.push('_'),
            c => result.push(c),
        }
    }

    while result.contains("__") {
        result = result.replace("__", "_");
    }

    let mut result = result.trim_matches('_');
    if let Some(rest) = result.strip_prefix("-_") {
        result = rest;
    }

    let result = match result.strip_prefix('-') {
        Some(rest) => format!("_{}", rest),
        None => result.to_string(),
    };

    let result = result.trim_start_matches('.');
    if result.is_empty() {
        "_".to_string()
    } else {
        result.to_string()
    }
}

fn is_digit_at(chars: &[char], i: usize) -> bool {
    chars.get(i).is_some_and(|c| c.is_ascii_digit())
}

fn transliterate(c: char) -> Option<&'static str> {
    let ascii = match c {
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => "A",
        'Æ' => "AE",
        'Ç' => "C",
        'È' | 'É' | 'Ê' | 'Ë' => "E",
        'Ì' | 'Í' | 'Î' | 'Ï' => "I",
        'Ð' => "D",
        'Ñ' => "N",
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ő' | 'Ø' => "O",
        'Œ' => "OE",
        'Ù' | 'Ú' | 'Û' | 'Ü' | 'Ű' => "U",
        'Ý' => "Y",
        'Þ' => "TH",
        'ß' => "ss",
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => "a",
        'æ' => "ae",
        'ç' => "c",
        'è' | 'é' | 'ê' | 'ë' => "e",
        'ì' | 'í' | 'î' | 'ï' => "i",
        'ð' => "o",
        'ñ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ő' | 'ø' => "o",
        'œ' => "oe",
        'ù' | 'ú' | 'û' | 'ü' | 'ű' => "u",
        'ý' | 'ÿ' => "y",
        'þ' => "th",
        _ => return None,
    };
    Some(ascii)
}
