//! Field remapping applied to every row of every sheet.

use xlconv_parser::{CellValue, Row, Sheet, Workbook};

/// One entry of the remapping table. When `source` and `target` differ the
/// value moves to `target` and `source` is removed.
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub source: &'static str,
    pub target: &'static str,
    pub transform: fn(&CellValue) -> CellValue,
}

impl FieldRule {
    pub const fn numeric(source: &'static str, target: &'static str) -> Self {
        Self {
            source,
            target,
            transform: to_number,
        }
    }

    pub fn renames(&self) -> bool {
        self.source != self.target
    }
}

pub const FIELD_RULES: [FieldRule; 4] = [
    FieldRule::numeric("APNATR", "APNATR"),
    FieldRule::numeric("APNSEQ", "APCONTA"),
    FieldRule::numeric("APNATG", "APNATG"),
    FieldRule::numeric("APNSEQG", "APCONTAG"),
];

pub fn apply_to_row(rules: &[FieldRule], row: &mut Row) {
    for rule in rules {
        let Some(value) = row.remove(rule.source) else {
            continue;
        };
        row.insert(rule.target.to_string(), (rule.transform)(&value));
    }
}

pub fn apply_to_sheet(rules: &[FieldRule], sheet: &mut Sheet) {
    for rule in rules.iter().filter(|rule| rule.renames()) {
        sheet.rename_column(rule.source, rule.target);
    }
    for row in &mut sheet.rows {
        apply_to_row(rules, row);
    }
}

pub fn apply_to_workbook(rules: &[FieldRule], workbook: &mut Workbook) {
    for sheet in &mut workbook.sheets {
        apply_to_sheet(rules, sheet);
    }
}

/// Numeric coercion that never fails: unparseable text becomes NaN.
pub fn to_number(value: &CellValue) -> CellValue {
    let number = match value {
        CellValue::Number(number) => *number,
        CellValue::Bool(true) => 1.0,
        CellValue::Bool(false) => 0.0,
        CellValue::Text(text) => parse_number(text),
    };
    CellValue::Number(number)
}

/// Locale-free text to number conversion.
///
/// Surrounding whitespace is ignored and blank text is zero. Accepts decimal
/// literals with optional sign, fraction and exponent, `Infinity` with an
/// optional sign, and unsigned `0x`/`0o`/`0b` integer literals. Anything else
/// is NaN.
pub fn parse_number(text: &str) -> f64 {
    let trimmed = text.trim_matches(|ch: char| ch.is_whitespace() || ch == '\u{feff}');
    if trimmed.is_empty() {
        return 0.0;
    }

    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }

    if let Some(value) = parse_prefixed_integer(trimmed) {
        return value;
    }

    // `str::parse::<f64>` also takes "inf" and "nan" spellings; only plain
    // decimal syntax gets through here.
    let decimal_syntax = trimmed
        .bytes()
        .all(|byte| byte.is_ascii_digit() || matches!(byte, b'+' | b'-' | b'.' | b'e' | b'E'));
    if !decimal_syntax {
        return f64::NAN;
    }

    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

fn parse_prefixed_integer(text: &str) -> Option<f64> {
    let radix = match text.get(..2)? {
        "0x" | "0X" => 16,
        "0o" | "0O" => 8,
        "0b" | "0B" => 2,
        _ => return None,
    };

    let digits = &text[2..];
    if digits.is_empty() {
        return Some(f64::NAN);
    }

    let value = digits.chars().try_fold(0.0_f64, |acc, ch| {
        ch.to_digit(radix)
            .map(|digit| acc * f64::from(radix) + f64::from(digit))
    });
    Some(value.unwrap_or(f64::NAN))
}
