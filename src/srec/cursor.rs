/// Cursor over the hex digit pairs of a single record body.
pub struct Cursor<'a> {
    len_remaining: usize,
    /// Index that the cursor is pointing to in the body
    curr_pt: usize,
    chars: &'a [u8],
}

impl<'a> Cursor<'a> {
    pub fn new(input: &'a str) -> Cursor<'a> {
        Cursor {
            len_remaining: input.len(),
            curr_pt: 0,
            chars: input.as_bytes(),
        }
    }

    /// Record is finished parsing
    pub fn is_eof(&self) -> bool {
        self.len_remaining == 0
    }

    /// Move cursor ahead in the input by given amount
    pub fn advance(&mut self, amt: usize) {
        self.curr_pt += amt;
        self.len_remaining -= amt;
    }

    /// Returns current cursor position
    pub fn curr_pt(&self) -> usize {
        self.curr_pt
    }

    /// Consume two hex digits. Either digit may be upper or lower case.
    ///
    /// On failure returns the offending character; the cursor does not move.
    pub fn bump_byte(&mut self) -> Result<Option<u8>, char> {
        if self.is_eof() {
            return Ok(None);
        }
        let Some(&[high, low]) = self.chars.get(self.curr_pt..self.curr_pt + 2) else {
            // Lone trailing digit
            return Err(char::from(self.chars[self.curr_pt]));
        };
        let byte = (hex_digit(high)? << 4) | hex_digit(low)?;
        self.advance(2);
        Ok(Some(byte))
    }
}

fn hex_digit(ch: u8) -> Result<u8, char> {
    char::from(ch)
        .to_digit(16)
        .map(|digit| digit as u8)
        .ok_or(char::from(ch))
}
