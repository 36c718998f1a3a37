//! Flattened, row-major text dumps of tensors with printf-style element formats.

use std::{
    fs::File,
    io::{BufWriter, Write},
    iter::Peekable,
    path::Path,
    str::{Chars, FromStr},
};

use itertools::Itertools;
use thiserror::Error;

use super::{
    num::Float,
    tensor::{Tensor, TensorError},
};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render error: invalid number format {0:?}")]
    Format(String),
    #[error("render error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Notation {
    /// `%f`
    #[default]
    Fixed,
    /// `%e`
    Exp,
    /// `%E`
    ExpUpper,
}

/// A printf-style format for one element: `%[-][0][width][.precision](f|e|E)`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NumberFormat {
    pub left: bool,
    pub zero: bool,
    pub width: Option<usize>,
    pub precision: Option<usize>,
    pub notation: Notation,
}

impl FromStr for NumberFormat {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RenderError::Format(s.to_string());
        let mut chars = s.strip_prefix('%').ok_or_else(invalid)?.chars().peekable();

        let mut format = Self::default();
        while let Some(&c) = chars.peek() {
            match c {
                '-' => format.left = true,
                '0' => format.zero = true,
                _ => break,
            }
            chars.next();
        }

        format.width = digits(&mut chars);
        if chars.next_if_eq(&'.').is_some() {
            // a bare `.` means precision 0
            format.precision = Some(digits(&mut chars).unwrap_or(0));
        }

        format.notation = match chars.next() {
            Some('f') => Notation::Fixed,
            Some('e') => Notation::Exp,
            Some('E') => Notation::ExpUpper,
            _ => return Err(invalid()),
        };
        match chars.next() {
            Some(_) => Err(invalid()),
            None => Ok(format),
        }
    }
}

impl NumberFormat {
    #[inline]
    pub fn parse(s: &str) -> Result<Self, RenderError> {
        s.parse()
    }

    pub fn format(&self, value: f64) -> String {
        let precision = self.precision.unwrap_or(6);
        let body = match self.notation {
            Notation::Fixed => format!("{value:.precision$}"),
            Notation::Exp => exponent(format!("{value:.precision$e}"), 'e'),
            Notation::ExpUpper => exponent(format!("{value:.precision$E}"), 'E'),
        };

        let width = match self.width {
            Some(width) if width > body.len() => width,
            _ => return body,
        };
        match (self.left, self.zero && value.is_finite()) {
            (true, _) => format!("{body:<width$}"),
            (false, true) => {
                let (sign, digits) = match body.strip_prefix('-') {
                    Some(digits) => ("-", digits),
                    None => ("", body.as_str()),
                };
                let width = width - sign.len();
                format!("{sign}{digits:0>width$}")
            }
            (false, false) => format!("{body:>width$}"),
        }
    }
}

fn digits(chars: &mut Peekable<Chars<'_>>) -> Option<usize> {
    let digits: String = chars.peeking_take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Rewrites Rust's exponent (`1.5e3`) in C's form (`1.5e+03`).
fn exponent(body: String, marker: char) -> String {
    let Some((mantissa, exp)) = body.split_once(marker) else {
        return body;
    };
    let (sign, digits) = match exp.strip_prefix('-') {
        Some(digits) => ('-', digits),
        None => ('+', exp),
    };
    format!("{mantissa}{marker}{sign}{digits:0>2}")
}

impl<T: Float> Tensor<T> {
    /// Writes all elements in row-major order separated by single spaces, followed by a newline.
    /// Device tensors are staged to the host first.
    pub fn write_to(&self, mut writer: impl Write, format: &str) -> Result<(), RenderError> {
        let line = self.render(format)?;
        writer.write_all(line.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    /// Renders the same line as [`Tensor::write_to`] into a string.
    pub fn render(&self, format: &str) -> Result<String, RenderError> {
        let format = NumberFormat::parse(format)?;
        let data = self.download()?;
        let mut line = data
            .into_iter()
            .map(|x| format.format(x.to_f64()))
            .join(" ");
        line.push('\n');
        Ok(line)
    }

    pub fn print(&self, format: &str) -> Result<(), RenderError> {
        self.write_to(std::io::stdout().lock(), format)
    }

    pub fn save(&self, path: impl AsRef<Path>, format: &str) -> Result<(), RenderError> {
        let file = File::create(path)?;
        self.write_to(BufWriter::new(file), format)
    }
}
