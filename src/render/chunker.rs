use crate::util::char_len;

/// Split `text` into ordered pieces of at most `limit` chars, preferring line
/// boundaries. Lines longer than `limit` are hard-split. Leading and trailing
/// newlines are trimmed from each piece and empty pieces are dropped.
pub fn chunk(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    if char_len(text) <= limit {
        return if text.is_empty() {
            Vec::new()
        } else {
            vec![text.to_string()]
        };
    }

    let mut builder = ChunkBuilder::new(limit);
    for line in text.split_inclusive('\n') {
        let line_len = char_len(line);
        if line_len > limit {
            for piece in hard_split(line, limit) {
                builder.push(piece, char_len(piece));
            }
        } else {
            builder.push(line, line_len);
        }
    }
    builder.finish()
}

struct ChunkBuilder {
    limit: usize,
    buffer: String,
    buffer_len: usize,
    pieces: Vec<String>,
}

impl ChunkBuilder {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            buffer: String::new(),
            buffer_len: 0,
            pieces: Vec::new(),
        }
    }

    fn push(&mut self, part: &str, part_len: usize) {
        if self.buffer_len > 0 && self.buffer_len + part_len > self.limit {
            self.flush();
        }
        self.buffer.push_str(part);
        self.buffer_len += part_len;
    }

    fn flush(&mut self) {
        let trimmed = self.buffer.trim_matches('\n');
        if !trimmed.is_empty() {
            self.pieces.push(trimmed.to_string());
        }
        self.buffer.clear();
        self.buffer_len = 0;
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.pieces
    }
}

fn hard_split(line: &str, limit: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (index, _) in line.char_indices() {
        if count == limit {
            pieces.push(&line[start..index]);
            start = index;
            count = 0;
        }
        count += 1;
    }
    if start < line.len() {
        pieces.push(&line[start..]);
    }
    pieces
}
