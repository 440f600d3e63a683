/// A contiguous line range of one file, the unit of embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub relative_path: String,

    /// 0-based, dense within the file
    pub chunk_index: u32,

    pub total_chunks: u32,

    /// 1-based, inclusive
    pub start_line: u32,

    /// 1-based, inclusive
    pub end_line: u32,

    pub content: String,
}

/// Split `content` into chunks of `chunk_size` lines; the last one may be shorter.
///
/// Content without any line yields no chunk.
pub fn chunk_lines(relative_path: &str, content: &str, chunk_size: usize) -> Vec<Chunk> {
    let lines: Vec<&str> = content.lines().collect();
    let chunk_size = chunk_size.max(1);
    let total_chunks = lines.len().div_ceil(chunk_size) as u32;

    lines
        .chunks(chunk_size)
        .enumerate()
        .map(|(index, window)| {
            let start_line = index * chunk_size + 1;
            Chunk {
                relative_path: relative_path.to_string(),
                chunk_index: index as u32,
                total_chunks,
                start_line: start_line as u32,
                end_line: (start_line + window.len() - 1) as u32,
                content: window.join("\n"),
            }
        })
        .collect()
}
