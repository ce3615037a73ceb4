//! Bounded text building
//!
//! A [`StringBuilder`] appends text to a caller supplied buffer and never writes past its end.
//! It keeps counting what would have been written once the buffer is full, so a caller can
//! retry with a buffer of exactly the right size.
//!
//! One byte of the buffer is always kept for the terminator written by
//! [`complete`](StringBuilder::complete).

use std::fmt;

/// Most decimal places a double is ever written with.
pub const MAX_DOUBLE_DECIMAL_PLACES: u8 = 15;

/// Append only text buffer over borrowed storage.
#[derive(Debug)]
pub struct StringBuilder<'a> {
    buf: &'a mut [u8],
    len: usize,
    added: usize,
    full: bool,
}

impl<'a> StringBuilder<'a> {
    /// Create a builder writing into `buf`.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            len: 0,
            added: 0,
            full: false,
        }
    }

    // Space left for text, the terminator is not included.
    fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.len + 1)
    }

    /// Append one character.
    pub fn add_char(&mut self, c: u8) -> &mut Self {
        if self.remaining() > 0 {
            self.buf[self.len] = c;
            self.len += 1;
        } else {
            self.full = true;
        }
        self.added += 1;
        self
    }

    /// Append a run of characters. A run which doesn't fit is not written at all.
    pub fn add_chars(&mut self, chars: &[u8]) -> &mut Self {
        if chars.len() <= self.remaining() {
            self.buf[self.len..self.len + chars.len()].copy_from_slice(chars);
            self.len += chars.len();
        } else {
            self.full = true;
        }
        self.added += chars.len();
        self
    }

    /// Append a string.
    pub fn add_str(&mut self, s: &str) -> &mut Self {
        self.add_chars(s.as_bytes())
    }

    /// Append an integer in decimal.
    pub fn add_integer(&mut self, value: i64) -> &mut Self {
        let mut digits = [0u8; 20];
        let mut pos = digits.len();
        let mut magnitude = value.unsigned_abs();
        loop {
            pos -= 1;
            digits[pos] = b'0' + (magnitude % 10) as u8;
            magnitude /= 10;
            if magnitude == 0 {
                break;
            }
        }
        if value < 0 {
            self.add_char(b'-');
        }
        self.add_chars(&digits[pos..])
    }

    /// Append a double in fixed point notation.
    ///
    /// At most `decimal_places` (capped at [`MAX_DOUBLE_DECIMAL_PLACES`]) fractional digits are
    /// written. The last digit is rounded half up, which may carry into the integer part.
    /// Trailing zeros, and a decimal point with nothing after it, are not written.
    pub fn add_double(&mut self, value: f64, decimal_places: u8) -> &mut Self {
        if !value.is_finite() {
            return self.add_str(&value.to_string());
        }
        let places = usize::from(decimal_places.min(MAX_DOUBLE_DECIMAL_PLACES));
        let mut whole = value.abs().trunc();
        let mut fraction = value.abs() - whole;

        let mut digits = [0u8; MAX_DOUBLE_DECIMAL_PLACES as usize];
        let mut count = 0;
        while count < places && fraction > 0.0 {
            fraction *= 10.0;
            let digit = fraction.trunc();
            digits[count] = digit as u8;
            fraction -= digit;
            count += 1;
        }

        if count == places && fraction >= 0.5 {
            let mut carry = true;
            for digit in digits[..count].iter_mut().rev() {
                if *digit == 9 {
                    *digit = 0;
                } else {
                    *digit += 1;
                    carry = false;
                    break;
                }
            }
            if carry {
                whole += 1.0;
            }
        }

        while count > 0 && digits[count - 1] == 0 {
            count -= 1;
        }

        if value < 0.0 && (whole > 0.0 || count > 0) {
            self.add_char(b'-');
        }
        if whole < i64::MAX as f64 {
            self.add_integer(whole as i64);
        } else {
            self.add_str(&format!("{whole:.0}"));
        }
        if count > 0 {
            let mut tail = [0u8; MAX_DOUBLE_DECIMAL_PLACES as usize + 1];
            tail[0] = b'.';
            for (t, d) in tail[1..].iter_mut().zip(&digits[..count]) {
                *t = b'0' + d;
            }
            self.add_chars(&tail[..=count]);
        }
        self
    }

    /// Terminate the text. The terminator counts as added.
    pub fn complete(&mut self) -> &mut Self {
        if self.len < self.buf.len() {
            self.buf[self.len] = 0;
        } else {
            self.full = true;
        }
        self.added += 1;
        self
    }

    /// Total characters added, including any which didn't fit.
    pub fn added(&self) -> usize {
        self.added
    }

    /// Was anything dropped because the buffer was too small?
    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Characters written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Characters written so far, as text.
    ///
    /// Everything the library writes is ASCII. If raw bytes were added which aren't valid
    /// UTF-8, the longest valid prefix is returned.
    pub fn as_str(&self) -> &str {
        match std::str::from_utf8(self.as_bytes()) {
            Ok(s) => s,
            Err(e) => {
                // valid_up_to() is a char boundary
                std::str::from_utf8(&self.as_bytes()[..e.valid_up_to()]).unwrap_or_default()
            }
        }
    }
}

impl fmt::Write for StringBuilder<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.add_str(s);
        Ok(())
    }
}
