use std::fmt::Write;

use base64::{engine::general_purpose::STANDARD, Engine};

/// Longest chunk of raw bytes per RFC 2047 encoded-word, keeping each word under 75 characters.
const ENCODED_WORD_BYTES: usize = 45;
/// Plain header lines are folded once they get longer than this.
const FOLD_AT: usize = 78;
/// Hard line length limit of RFC 5322, without the line ending.
const MAX_LINE_LENGTH: usize = 998;

/// Builds an RFC 5322 message, as expected by `sendmail -t`: headers, a blank line, then the body,
/// all with `\n` line endings.
#[derive(Default)]
pub struct MessageBuilder {
    pub(crate) headers: String,
    pub(crate) body: String,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn build(self) -> String {
        let mut message = self.headers;
        message.push('\n');
        message.push_str(&self.body);
        if !message.ends_with('\n') {
            message.push('\n');
        }
        message
    }

    /// Appends a header, encoding the value if it isn't plain ASCII. Long values are folded at
    /// spaces; ones that can't be folded below the line length limit are encoded too.
    pub fn header(&mut self, name: &str, value: &str) {
        let value = single_line(value);
        write!(self.headers, "{}: ", name).unwrap();
        let prefix_len = name.len() + 2;
        let foldable = value
            .split(' ')
            .all(|word| prefix_len + 1 + word.len() <= MAX_LINE_LENGTH);
        if value.is_ascii() && foldable {
            self.push_folded(prefix_len, &value);
        } else {
            self.push_encoded_words(&value);
        }
        self.headers.push('\n');
    }

    /// Appends an address header with a display name, e.g. `From: "Jane" <jane@example.org>`.
    pub fn mailbox(&mut self, name: &str, display_name: &str, address: &str) {
        let display_name = single_line(display_name);
        write!(self.headers, "{}: ", name).unwrap();
        if display_name.is_ascii() {
            let quoted = display_name.replace('\\', "\\\\").replace('"', "\\\"");
            write!(self.headers, "\"{}\"", quoted).unwrap();
        } else {
            self.push_encoded_words(&display_name);
        }
        writeln!(self.headers, " <{}>", single_line(address)).unwrap();
    }

    fn push_folded(&mut self, prefix_len: usize, value: &str) {
        let mut words = value.split(' ');
        let mut line_len = prefix_len;

        if let Some(first) = words.next() {
            self.headers.push_str(first);
            line_len += first.len();
        }
        for word in words {
            // the space stays in front of the word, unfolding gives back the original value
            if !word.is_empty() && line_len + 1 + word.len() > FOLD_AT {
                self.headers.push('\n');
                line_len = 0;
            }
            self.headers.push(' ');
            self.headers.push_str(word);
            line_len += 1 + word.len();
        }
    }

    fn push_encoded_words(&mut self, value: &str) {
        let mut chunk_start = 0;
        let mut first = true;

        for (i, c) in value.char_indices() {
            let end = i + c.len_utf8();
            if end - chunk_start > ENCODED_WORD_BYTES {
                self.push_encoded_word(&value[chunk_start..i], first);
                chunk_start = i;
                first = false;
            }
        }
        self.push_encoded_word(&value[chunk_start..], first);
    }

    fn push_encoded_word(&mut self, chunk: &str, first: bool) {
        if !first {
            // folding whitespace between encoded words is dropped by readers
            self.headers.push_str("\n ");
        }
        write!(self.headers, "=?utf-8?B?{}?=", STANDARD.encode(chunk)).unwrap();
    }
}

impl std::fmt::Write for MessageBuilder {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        // sendmail wants local line endings
        self.body.push_str(&s.replace("\r\n", "\n").replace('\r', "\n"));
        Ok(())
    }
}

/// Header values can come from GitHub users: collapse line breaks so they can't inject headers.
fn single_line(value: &str) -> String {
    value
        .split(['\r', '\n'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
