//! Spoken-number conversion.
//!
//! House numbers arrive in many shapes: "twenty nine", "one twenty two",
//! "two nine four zero", "twenty nine forty", "two thousand nine hundred forty".
//! A run of number words (and bare digit tokens) is parsed into chunks which
//! are then concatenated, matching how people read addresses aloud.

fn unit_value(word: &str) -> Option<u64> {
    let value = match word {
        "zero" | "oh" => 0,
        "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        _ => return None,
    };
    Some(value)
}

fn teen_value(word: &str) -> Option<u64> {
    let value = match word {
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        "thirteen" => 13,
        "fourteen" => 14,
        "fifteen" => 15,
        "sixteen" => 16,
        "seventeen" => 17,
        "eighteen" => 18,
        "nineteen" => 19,
        _ => return None,
    };
    Some(value)
}

fn tens_value(word: &str) -> Option<u64> {
    let value = match word {
        "twenty" => 20,
        "thirty" => 30,
        "forty" | "fourty" => 40,
        "fifty" => 50,
        "sixty" => 60,
        "seventy" => 70,
        "eighty" => 80,
        "ninety" => 90,
        _ => return None,
    };
    Some(value)
}

/// Whether the token can take part in a spoken-number run.
pub fn is_number_token(token: &str) -> bool {
    is_digits(token)
        || unit_value(token).is_some()
        || teen_value(token).is_some()
        || tens_value(token).is_some()
        || token == "hundred"
        || token == "thousand"
}

fn is_digits(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_digit())
}

#[derive(Debug, Default)]
struct Chunk {
    /// Pre-rendered digits for a bare numeric token.
    literal: Option<String>,
    value: u64,
    /// Amount added since the last hundred/thousand multiplier.
    tail: u64,
    /// A multiplier was applied; later words add to the value instead of starting a chunk.
    compound: bool,
    /// Ends in a tens word and can still absorb a unit ("twenty" + "nine").
    open_tens: bool,
}

impl Chunk {
    fn render(&self) -> String {
        match &self.literal {
            Some(digits) => digits.clone(),
            None => self.value.to_string(),
        }
    }
}

/// Longest run read as one number; phone numbers read digit by digit stay well under it.
const MAX_RUN_TOKENS: usize = 24;

/// Convert one run of number tokens into a digit string.
///
/// Returns `None` if the run is empty, too long, contains a non-number token
/// or its value does not fit in a `u64`.
pub fn parse_number_run(tokens: &[&str]) -> Option<String> {
    if tokens.is_empty() || tokens.len() > MAX_RUN_TOKENS {
        return None;
    }

    let mut chunks: Vec<Chunk> = Vec::new();
    for &token in tokens {
        if is_digits(token) {
            chunks.push(Chunk {
                literal: Some(token.to_string()),
                ..Chunk::default()
            });
            continue;
        }

        if token == "hundred" || token == "thousand" {
            let factor = if token == "hundred" { 100 } else { 1000 };
            match chunks.last_mut() {
                Some(last) if last.literal.is_none() => {
                    last.value = if last.compound && last.tail > 0 && factor == 100 {
                        (last.value - last.tail).checked_add(last.tail.checked_mul(factor)?)?
                    } else {
                        last.value.max(1).checked_mul(factor)?
                    };
                    last.tail = 0;
                    last.compound = true;
                    last.open_tens = false;
                }
                _ => chunks.push(Chunk {
                    value: factor,
                    compound: true,
                    ..Chunk::default()
                }),
            }
            continue;
        }

        if let Some(unit) = unit_value(token) {
            if let Some(last) = chunks.last_mut() {
                if last.literal.is_none() && unit > 0 && (last.open_tens || last.compound) {
                    last.value = last.value.checked_add(unit)?;
                    last.tail += unit;
                    last.open_tens = false;
                    continue;
                }
            }
            chunks.push(Chunk {
                value: unit,
                ..Chunk::default()
            });
            continue;
        }

        if let Some(teen) = teen_value(token) {
            if let Some(last) = chunks.last_mut() {
                if last.literal.is_none() && last.compound && last.value % 100 == 0 {
                    last.value = last.value.checked_add(teen)?;
                    last.tail += teen;
                    continue;
                }
            }
            chunks.push(Chunk {
                value: teen,
                ..Chunk::default()
            });
            continue;
        }

        let tens = tens_value(token)?;
        if let Some(last) = chunks.last_mut() {
            if last.literal.is_none() && last.compound && last.value % 100 == 0 {
                last.value = last.value.checked_add(tens)?;
                last.tail += tens;
                last.open_tens = true;
                continue;
            }
        }
        chunks.push(Chunk {
            value: tens,
            open_tens: true,
            ..Chunk::default()
        });
    }

    Some(chunks.iter().map(Chunk::render).collect())
}

/// Replace every run of number tokens with a single digit token.
pub fn collapse_number_words(tokens: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        if !is_number_token(&tokens[i]) {
            out.push(tokens[i].clone());
            i += 1;
            continue;
        }
        let start = i;
        while i < tokens.len() && is_number_token(&tokens[i]) {
            i += 1;
        }
        let run: Vec<&str> = tokens[start..i].iter().map(String::as_str).collect();
        match parse_number_run(&run) {
            Some(digits) => out.push(digits),
            None => out.extend(tokens[start..i].iter().cloned()),
        }
    }
    out
}
