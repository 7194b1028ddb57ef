//! Positional printf-style formatting.

use crate::error::{ConfigError, Result};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"%(?:(\d+)\$)?([-0+]*)(\d+)?(?:\.(\d+))?([a-zA-Z%])")
        .expect("directive pattern is valid")
});

/// A single argument for [`Substitutor::replace_args`](super::Substitutor::replace_args).
#[derive(Debug, Clone, PartialEq)]
pub enum FormatArg {
    /// Text.
    Str(String),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    UInt(u64),
    /// Floating point number.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// Single character.
    Char(char),
}

impl fmt::Display for FormatArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(n) => write!(f, "{}", n),
            Self::UInt(n) => write!(f, "{}", n),
            Self::Float(x) => write!(f, "{}", x),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Char(c) => write!(f, "{}", c),
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident as $target:ty),* $(,)?) => {
        $(
            impl From<$ty> for FormatArg {
                fn from(value: $ty) -> Self {
                    Self::$variant(value as $target)
                }
            }
        )*
    };
}

impl_from! {
    i8 => Int as i64,
    i16 => Int as i64,
    i32 => Int as i64,
    i64 => Int as i64,
    isize => Int as i64,
    u8 => UInt as u64,
    u16 => UInt as u64,
    u32 => UInt as u64,
    u64 => UInt as u64,
    usize => UInt as u64,
    f32 => Float as f64,
    f64 => Float as f64,
}

impl From<bool> for FormatArg {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<char> for FormatArg {
    fn from(value: char) -> Self {
        Self::Char(value)
    }
}

impl From<&str> for FormatArg {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for FormatArg {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// Parsed flags of a single directive.
struct Spec<'a> {
    left: bool,
    zero: bool,
    plus: bool,
    width: Option<usize>,
    precision: Option<usize>,
    directive: &'a str,
}

/// Format `template` with positional `args`.
///
/// Supports `%s %S %d %x %X %o %f %e %b %c %n %%`, the `-`, `0` and `+`
/// flags, width, precision and explicit `%N$` positions.
pub(crate) fn format_args_printf(template: &str, args: &[FormatArg]) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    let mut next_arg = 0;

    for caps in DIRECTIVE.captures_iter(template) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        push_literal(&mut out, &template[last..whole.start])?;
        last = whole.end;

        let flags = caps.get(2).map_or("", |m| m.as_str());
        let spec = Spec {
            left: flags.contains('-'),
            zero: flags.contains('0'),
            plus: flags.contains('+'),
            width: caps.get(3).and_then(|m| m.as_str().parse().ok()),
            precision: caps.get(4).and_then(|m| m.as_str().parse().ok()),
            directive: &template[whole.clone()],
        };
        let conversion = caps
            .get(5)
            .and_then(|m| m.as_str().chars().next())
            .unwrap_or('%');

        match conversion {
            '%' => out.push_str(&pad(&spec, "%".to_string(), false)),
            'n' => out.push('\n'),
            _ => {
                let index = match caps.get(1) {
                    Some(pos) => pos
                        .as_str()
                        .parse::<usize>()
                        .ok()
                        .and_then(|p| p.checked_sub(1))
                        .ok_or_else(|| {
                            ConfigError::FormatError(format!(
                                "invalid argument position in '{}'",
                                spec.directive
                            ))
                        })?,
                    None => {
                        let index = next_arg;
                        next_arg += 1;
                        index
                    }
                };
                let arg = args.get(index).ok_or_else(|| {
                    ConfigError::FormatError(format!(
                        "missing argument {} for '{}'",
                        index + 1,
                        spec.directive
                    ))
                })?;
                out.push_str(&convert(&spec, conversion, arg)?);
            }
        }
    }

    push_literal(&mut out, &template[last..])?;
    Ok(out)
}

fn push_literal(out: &mut String, literal: &str) -> Result<()> {
    if let Some(pos) = literal.find('%') {
        return Err(ConfigError::FormatError(format!(
            "unknown format directive at '{}'",
            &literal[pos..]
        )));
    }
    out.push_str(literal);
    Ok(())
}

fn convert(spec: &Spec<'_>, conversion: char, arg: &FormatArg) -> Result<String> {
    let text = match (conversion, arg) {
        ('s' | 'S', _) => {
            let mut text = arg.to_string();
            if let Some(precision) = spec.precision {
                text = text.chars().take(precision).collect();
            }
            if conversion == 'S' {
                text = text.to_uppercase();
            }
            return Ok(pad(spec, text, false));
        }
        ('b' | 'B', FormatArg::Bool(b)) => b.to_string(),
        ('b' | 'B', _) => "true".to_string(),
        ('c', FormatArg::Char(c)) => c.to_string(),
        ('c', FormatArg::UInt(n)) => char_from(*n, spec)?.to_string(),
        ('c', FormatArg::Int(n)) => {
            let n = u64::try_from(*n).map_err(|_| mismatch(spec, arg))?;
            char_from(n, spec)?.to_string()
        }
        ('d', FormatArg::Int(n)) => signed(spec, *n < 0, n.unsigned_abs().to_string()),
        ('d', FormatArg::UInt(n)) => signed(spec, false, n.to_string()),
        ('x', FormatArg::Int(n)) => format!("{:x}", n),
        ('x', FormatArg::UInt(n)) => format!("{:x}", n),
        ('X', FormatArg::Int(n)) => format!("{:X}", n),
        ('X', FormatArg::UInt(n)) => format!("{:X}", n),
        ('o', FormatArg::Int(n)) => format!("{:o}", n),
        ('o', FormatArg::UInt(n)) => format!("{:o}", n),
        ('f' | 'e' | 'E', FormatArg::Float(x)) => float(spec, conversion, *x),
        ('f' | 'e' | 'E', FormatArg::Int(n)) => float(spec, conversion, *n as f64),
        ('f' | 'e' | 'E', FormatArg::UInt(n)) => float(spec, conversion, *n as f64),
        _ => return Err(mismatch(spec, arg)),
    };

    let numeric = matches!(conversion, 'd' | 'x' | 'X' | 'o' | 'f' | 'e' | 'E');
    Ok(pad(spec, text, numeric))
}

fn mismatch(spec: &Spec<'_>, arg: &FormatArg) -> ConfigError {
    ConfigError::FormatError(format!("'{}' cannot format {:?}", spec.directive, arg))
}

fn char_from(code: u64, spec: &Spec<'_>) -> Result<char> {
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| {
            ConfigError::FormatError(format!("'{}': invalid code point {}", spec.directive, code))
        })
}

fn signed(spec: &Spec<'_>, negative: bool, digits: String) -> String {
    if negative {
        format!("-{}", digits)
    } else if spec.plus {
        format!("+{}", digits)
    } else {
        digits
    }
}

fn float(spec: &Spec<'_>, conversion: char, x: f64) -> String {
    let precision = spec.precision.unwrap_or(6);
    let body = if conversion == 'f' {
        format!("{:.*}", precision, x.abs())
    } else {
        // Rust renders `1.5e3`; printf renders `1.500000e+03`.
        let rendered = format!("{:.*e}", precision, x.abs());
        let (mantissa, exponent) = rendered.split_once('e').unwrap_or((&rendered, "0"));
        let exponent: i32 = exponent.parse().unwrap_or(0);
        let sign = if exponent < 0 { '-' } else { '+' };
        let body = format!("{}e{}{:02}", mantissa, sign, exponent.abs());
        if conversion == 'E' {
            body.to_uppercase()
        } else {
            body
        }
    };
    signed(spec, x.is_sign_negative() && x != 0.0, body)
}

fn pad(spec: &Spec<'_>, text: String, numeric: bool) -> String {
    let Some(width) = spec.width else {
        return text;
    };
    let len = text.chars().count();
    if len >= width {
        return text;
    }
    let fill = width - len;

    if spec.left {
        format!("{}{}", text, " ".repeat(fill))
    } else if spec.zero && numeric {
        let (sign, digits) = match text.strip_prefix(['-', '+']) {
            Some(rest) => (&text[..1], rest),
            None => ("", text.as_str()),
        };
        format!("{}{}{}", sign, "0".repeat(fill), digits)
    } else {
        format!("{}{}", " ".repeat(fill), text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(template: &str, args: &[FormatArg]) -> String {
        format_args_printf(template, args).unwrap()
    }

    #[test]
    fn test_strings() {
        assert_eq!(fmt("Hello %s", &["World".into()]), "Hello World");
        assert_eq!(fmt("%S!", &["hey".into()]), "HEY!");
        assert_eq!(fmt("[%5s|%-5s]", &["ab".into(), "cd".into()]), "[   ab|cd   ]");
        assert_eq!(fmt("%.3s", &["abcdef".into()]), "abc");
    }

    #[test]
    fn test_integers() {
        assert_eq!(fmt("%d items", &[42.into()]), "42 items");
        assert_eq!(fmt("%05d", &[(-42).into()]), "-0042");
        assert_eq!(fmt("%+d", &[7.into()]), "+7");
        assert_eq!(fmt("%x %X %o", &[255.into(), 255.into(), 8.into()]), "ff FF 10");
    }

    #[test]
    fn test_floats() {
        assert_eq!(fmt("%.2f", &[3.14159.into()]), "3.14");
        assert_eq!(fmt("%f", &[1.5.into()]), "1.500000");
        assert_eq!(fmt("%.3e", &[1500.0.into()]), "1.500e+03");
        assert_eq!(fmt("%08.2f", &[(-3.5).into()]), "-0003.50");
    }

    #[test]
    fn test_explicit_positions() {
        assert_eq!(fmt("%2$s %1$s", &["a".into(), "b".into()]), "b a");
    }

    #[test]
    fn test_literals() {
        assert_eq!(fmt("100%%", &[]), "100%");
        assert_eq!(fmt("a%nb", &[]), "a\nb");
        assert_eq!(fmt("%b %c", &[true.into(), 'z'.into()]), "true z");
    }

    #[test]
    fn test_errors() {
        assert!(format_args_printf("%s %s", &["one".into()]).is_err());
        assert!(format_args_printf("%d", &["text".into()]).is_err());
        assert!(format_args_printf("%q", &["x".into()]).is_err());
        assert!(format_args_printf("50%", &[]).is_err());
    }
}
