// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Spanish number words for amounts printed on certificates.

use crate::models::Money;

const UNITS: [&str; 30] = [
    "cero",
    "uno",
    "dos",
    "tres",
    "cuatro",
    "cinco",
    "seis",
    "siete",
    "ocho",
    "nueve",
    "diez",
    "once",
    "doce",
    "trece",
    "catorce",
    "quince",
    "dieciséis",
    "diecisiete",
    "dieciocho",
    "diecinueve",
    "veinte",
    "veintiuno",
    "veintidós",
    "veintitrés",
    "veinticuatro",
    "veinticinco",
    "veintiséis",
    "veintisiete",
    "veintiocho",
    "veintinueve",
];

const TENS: [&str; 10] = [
    "", "", "", "treinta", "cuarenta", "cincuenta", "sesenta", "setenta", "ochenta", "noventa",
];

const HUNDREDS: [&str; 10] = [
    "",
    "ciento",
    "doscientos",
    "trescientos",
    "cuatrocientos",
    "quinientos",
    "seiscientos",
    "setecientos",
    "ochocientos",
    "novecientos",
];

const MILLION: u64 = 1_000_000;
const BILLION: u64 = 1_000_000_000_000;

/// Spell out a non-negative integer in Spanish, lowercase.
///
/// Uses the long scale: 10^9 is "mil millones", 10^12 is "un billón".
pub fn number_to_words(n: u64) -> String {
    if n == 0 {
        return UNITS[0].to_string();
    }
    words(n)
}

/// Spell out an amount, cheque style: `cinco mil con 00/100 dólares`.
pub fn amount_to_words(amount: Money, currency: &str) -> String {
    let minor = amount.minor();
    let (major, cents) = (minor.unsigned_abs() / 100, minor.unsigned_abs() % 100);

    let mut spelled = number_to_words(major);
    if minor < 0 {
        spelled.insert_str(0, "menos ");
    }
    format!("{spelled} con {cents:02}/100 {}", currency_name(currency))
}

/// Plural currency noun for known ISO codes; the code itself otherwise.
pub fn currency_name(code: &str) -> String {
    match code.to_ascii_uppercase().as_str() {
        "USD" => "dólares".to_string(),
        "EUR" => "euros".to_string(),
        "MXN" | "COP" | "CLP" | "ARS" => "pesos".to_string(),
        "PEN" => "soles".to_string(),
        other => other.to_string(),
    }
}

fn words(n: u64) -> String {
    if n >= BILLION {
        let (high, rest) = (n / BILLION, n % BILLION);
        let head = if high == 1 {
            "un billón".to_string()
        } else {
            format!("{} billones", apocope(&words(high)))
        };
        return join(head, rest);
    }
    if n >= MILLION {
        let (high, rest) = (n / MILLION, n % MILLION);
        let head = if high == 1 {
            "un millón".to_string()
        } else {
            format!("{} millones", apocope(&words(high)))
        };
        return join(head, rest);
    }
    if n >= 1_000 {
        let (high, rest) = (n / 1_000, n % 1_000);
        let head = if high == 1 {
            "mil".to_string()
        } else {
            format!("{} mil", apocope(&below_thousand(high)))
        };
        return join(head, rest);
    }
    below_thousand(n)
}

fn below_thousand(n: u64) -> String {
    debug_assert!(n < 1_000);
    if n == 100 {
        return "cien".to_string();
    }
    let (hundreds, rest) = ((n / 100) as usize, n % 100);
    let head = HUNDREDS[hundreds];
    match (head.is_empty(), rest) {
        (true, _) => below_hundred(rest),
        (false, 0) => head.to_string(),
        (false, _) => format!("{head} {}", below_hundred(rest)),
    }
}

fn below_hundred(n: u64) -> String {
    let n = n as usize;
    if n < UNITS.len() {
        return UNITS[n].to_string();
    }
    let (tens, units) = (n / 10, n % 10);
    if units == 0 {
        TENS[tens].to_string()
    } else {
        format!("{} y {}", TENS[tens], UNITS[units])
    }
}

fn join(head: String, rest: u64) -> String {
    if rest == 0 {
        head
    } else {
        format!("{head} {}", words(rest))
    }
}

/// Shortened form used before a noun: "uno" becomes "un".
fn apocope(words: &str) -> String {
    if let Some(stem) = words.strip_suffix("veintiuno") {
        format!("{stem}veintiún")
    } else if let Some(stem) = words.strip_suffix("uno") {
        format!("{stem}un")
    } else {
        words.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_numbers() {
        assert_eq!(number_to_words(0), "cero");
        assert_eq!(number_to_words(1), "uno");
        assert_eq!(number_to_words(16), "dieciséis");
        assert_eq!(number_to_words(22), "veintidós");
        assert_eq!(number_to_words(31), "treinta y uno");
        assert_eq!(number_to_words(90), "noventa");
    }

    #[test]
    fn hundreds() {
        assert_eq!(number_to_words(100), "cien");
        assert_eq!(number_to_words(101), "ciento uno");
        assert_eq!(number_to_words(500), "quinientos");
        assert_eq!(number_to_words(999), "novecientos noventa y nueve");
    }

    #[test]
    fn thousands_and_millions() {
        assert_eq!(number_to_words(1_000), "mil");
        assert_eq!(number_to_words(5_000), "cinco mil");
        assert_eq!(number_to_words(21_000), "veintiún mil");
        assert_eq!(number_to_words(31_500), "treinta y un mil quinientos");
        assert_eq!(number_to_words(100_000), "cien mil");
        assert_eq!(number_to_words(1_000_000), "un millón");
        assert_eq!(number_to_words(2_500_001), "dos millones quinientos mil uno");
        assert_eq!(number_to_words(1_000_000_000), "mil millones");
        assert_eq!(number_to_words(1_000_000_000_000), "un billón");
    }

    #[test]
    fn amounts() {
        assert_eq!(
            amount_to_words(Money::from_minor(500_000), "USD"),
            "cinco mil con 00/100 dólares"
        );
        assert_eq!(
            amount_to_words(Money::from_minor(5_075), "eur"),
            "cincuenta con 75/100 euros"
        );
        assert_eq!(
            amount_to_words(Money::from_minor(100), "XYZ"),
            "uno con 00/100 XYZ"
        );
    }
}
