/// A cursor over a byte slice.
///
/// All `read_*` methods advance the cursor and return `None` instead of
/// panicking when out of data, so parse failures can be bubbled up with `?`.
#[derive(Clone, Debug)]
pub struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

pub(crate) fn is_white_space(b: u8) -> bool {
    matches!(b, b'\0' | b'\t' | b'\n' | b'\x0c' | b'\r' | b' ')
}

pub(crate) fn is_delimiter(b: u8) -> bool {
    matches!(b, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn at_end(&self) -> bool {
        self.offset >= self.data.len()
    }

    #[inline]
    pub fn peek_byte(&self) -> Option<u8> {
        self.data.get(self.offset).copied()
    }

    #[inline]
    pub fn peek_bytes(&self, n: usize) -> Option<&'a [u8]> {
        self.data.get(self.offset..self.offset + n)
    }

    #[inline]
    pub fn read_byte(&mut self) -> Option<u8> {
        let b = self.peek_byte()?;
        self.offset += 1;

        Some(b)
    }

    #[inline]
    pub fn read_bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        let bytes = self.peek_bytes(n)?;
        self.offset += n;

        Some(bytes)
    }

    #[inline]
    pub fn forward(&mut self) {
        self.offset = (self.offset + 1).min(self.data.len());
    }

    /// Move the cursor to an absolute offset.
    pub fn jump(&mut self, offset: usize) {
        self.offset = offset.min(self.data.len());
    }

    pub fn tail(&self) -> &'a [u8] {
        &self.data[self.offset.min(self.data.len())..]
    }

    pub fn range(&self, start: usize, end: usize) -> Option<&'a [u8]> {
        self.data.get(start..end)
    }

    pub fn read_u16(&mut self) -> Option<u16> {
        let b = self.read_bytes(2)?;

        Some(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Option<u32> {
        let b = self.read_bytes(4)?;

        Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn skip_white_spaces(&mut self) {
        while let Some(b) = self.peek_byte() {
            if is_white_space(b) {
                self.forward();
            } else {
                return;
            }
        }
    }

    pub fn skip_white_spaces_and_comments(&mut self) {
        while let Some(b) = self.peek_byte() {
            if is_white_space(b) {
                self.forward();
            } else if b == b'%' {
                while let Some(b) = self.peek_byte() {
                    if b == b'\n' || b == b'\r' {
                        break;
                    }

                    self.forward();
                }
            } else {
                return;
            }
        }
    }

    /// Read until the next whitespace or delimiter byte, returning the run.
    pub fn read_regular_run(&mut self) -> &'a [u8] {
        let start = self.offset;

        while let Some(b) = self.peek_byte() {
            if is_white_space(b) || is_delimiter(b) {
                break;
            }

            self.forward();
        }

        &self.data[start..self.offset]
    }
}

#[cfg(test)]
mod tests {
    use super::Reader;

    #[test]
    fn regular_run_stops_at_delimiter() {
        let mut r = Reader::new(b"abc/def");
        assert_eq!(r.read_regular_run(), b"abc");
        assert_eq!(r.peek_byte(), Some(b'/'));
    }

    #[test]
    fn comments_are_whitespace() {
        let mut r = Reader::new(b"  % a comment\n 42");
        r.skip_white_spaces_and_comments();
        assert_eq!(r.peek_byte(), Some(b'4'));
    }
}
