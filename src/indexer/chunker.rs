use super::ast_parser::ParseResult;
use super::file_info::SourceFile;
use super::fingerprint::fingerprint;
use super::{ChunkId, CodeChunk};
use crate::config::IndexingConfig;

/// Strategy for chunking code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStrategy {
    /// One chunk per outermost symbol, gap chunks in between; symbols longer
    /// than `max_lines` are split into `window_lines` windows
    SymbolAligned { max_lines: usize, window_lines: usize },
    /// Fixed number of lines per chunk
    FixedLines(usize),
}

#[derive(Debug, Clone)]
pub struct CodeChunker {
    strategy: ChunkStrategy,
}

/// A byte range of the file before it becomes a chunk
#[derive(Debug, Clone, Copy)]
struct Segment {
    start: usize,
    end: usize,
    /// Index into the parse result's symbols
    symbol: Option<usize>,
}

impl CodeChunker {
    pub fn new(strategy: ChunkStrategy) -> Self {
        Self { strategy }
    }

    pub fn from_config(config: &IndexingConfig) -> Self {
        Self::new(ChunkStrategy::SymbolAligned {
            max_lines: config.max_chunk_lines.max(1),
            window_lines: config.window_lines.max(1),
        })
    }

    /// Create a chunker with default strategy (symbol-aligned, 120/50 lines)
    pub fn default_strategy() -> Self {
        Self::new(ChunkStrategy::SymbolAligned {
            max_lines: 120,
            window_lines: 50,
        })
    }

    pub fn strategy(&self) -> ChunkStrategy {
        self.strategy
    }

    /// Stable description of the chunking parameters. Chunks persisted under a
    /// different signature must be recomputed even when file content is unchanged.
    pub fn signature(&self) -> String {
        match self.strategy {
            ChunkStrategy::SymbolAligned {
                max_lines,
                window_lines,
            } => format!("symbol:{}:{}", max_lines, window_lines),
            ChunkStrategy::FixedLines(n) => format!("lines:{}", n),
        }
    }

    /// Chunk a file. `parsed` is `None` when the file was not parsed or parsing
    /// failed; the file is then split into line windows.
    ///
    /// The concatenation of the returned chunk contents equals `file.content`.
    pub fn chunk_file(&self, file: &SourceFile, parsed: Option<&ParseResult>) -> Vec<CodeChunk> {
        let text = file.content.as_str();
        if text.is_empty() {
            return Vec::new();
        }

        let lines = LineIndex::new(text);
        let (segments, max_lines, window_lines) = match self.strategy {
            ChunkStrategy::FixedLines(n) => {
                let n = n.max(1);
                (lines.windows(0, text.len(), n), usize::MAX, n)
            }
            ChunkStrategy::SymbolAligned {
                max_lines,
                window_lines,
            } => match parsed.filter(|p| p.top_level().next().is_some()) {
                Some(parsed) => (
                    symbol_segments(text, &lines, parsed),
                    max_lines.max(1),
                    window_lines.max(1),
                ),
                None => {
                    let n = window_lines.max(1);
                    (lines.windows(0, text.len(), n), usize::MAX, n)
                }
            },
        };
        let segments = merge_blank_segments(text, segments);

        let unique_names = parsed.map(ParseResult::unique_names).unwrap_or_default();
        let mut chunks = Vec::with_capacity(segments.len());
        let mut gap_ordinal = 0;

        for segment in segments {
            let line_count = lines.line_of(segment.end - 1) - lines.line_of(segment.start) + 1;

            match (segment.symbol, parsed) {
                (Some(index), Some(parsed)) => {
                    let symbol = &parsed.symbols[index];
                    let unique = &unique_names[index];
                    if line_count <= max_lines {
                        chunks.push(self.make_chunk(
                            file,
                            &lines,
                            segment.start,
                            segment.end,
                            ChunkId::for_symbol(&file.relative_path, unique),
                            Some(symbol.qualified_name.clone()),
                            None,
                            None,
                        ));
                    } else {
                        for (part, (start, end)) in lines
                            .windows_raw(segment.start, segment.end, window_lines)
                            .into_iter()
                            .enumerate()
                        {
                            chunks.push(self.make_chunk(
                                file,
                                &lines,
                                start,
                                end,
                                ChunkId::for_part(&file.relative_path, unique, part + 1),
                                None,
                                Some(symbol.qualified_name.clone()),
                                Some(part + 1),
                            ));
                        }
                    }
                }
                _ => {
                    let ranges = if line_count <= max_lines {
                        vec![(segment.start, segment.end)]
                    } else {
                        lines.windows_raw(segment.start, segment.end, window_lines)
                    };
                    for (start, end) in ranges {
                        gap_ordinal += 1;
                        chunks.push(self.make_chunk(
                            file,
                            &lines,
                            start,
                            end,
                            ChunkId::for_lines(&file.relative_path, gap_ordinal),
                            None,
                            None,
                            None,
                        ));
                    }
                }
            }
        }

        chunks
    }

    #[allow(clippy::too_many_arguments)]
    fn make_chunk(
        &self,
        file: &SourceFile,
        lines: &LineIndex,
        start: usize,
        end: usize,
        id: ChunkId,
        symbol: Option<String>,
        owner_symbol: Option<String>,
        part: Option<usize>,
    ) -> CodeChunk {
        let content = file.content[start..end].to_string();
        let context = match (&symbol, &owner_symbol) {
            (Some(name), _) | (None, Some(name)) => format!("{} > {}", file.relative_path, name),
            (None, None) => file.relative_path.clone(),
        };

        CodeChunk {
            fingerprint: fingerprint(content.as_bytes()),
            id,
            file_path: file.relative_path.clone(),
            language: file.language,
            content,
            start_byte: start,
            end_byte: end,
            start_line: lines.line_of(start),
            end_line: lines.line_of(end - 1),
            symbol,
            owner_symbol,
            part,
            context,
        }
    }
}

impl Default for CodeChunker {
    fn default() -> Self {
        Self::default_strategy()
    }
}

/// The chunk whose byte span contains `offset`
pub fn chunk_at_offset(chunks: &[CodeChunk], offset: usize) -> Option<&CodeChunk> {
    let index = chunks.partition_point(|c| c.end_byte <= offset);
    chunks.get(index).filter(|c| c.start_byte <= offset)
}

/// Outermost symbols and the gaps between them, covering the whole text
fn symbol_segments(text: &str, lines: &LineIndex, parsed: &ParseResult) -> Vec<Segment> {
    let mut top: Vec<(usize, usize, usize)> = parsed
        .top_level()
        .map(|(i, s)| (s.start_byte, s.end_byte, i))
        .collect();
    top.sort_by_key(|&(start, end, _)| (start, std::cmp::Reverse(end)));

    let mut segments: Vec<Segment> = Vec::new();
    let mut cursor = 0;

    for (position, &(start, end, index)) in top.iter().enumerate() {
        if start < cursor || end <= start || end > text.len() {
            continue;
        }

        // Indentation before the symbol belongs to it
        let line_start = lines.start_of_line_containing(start);
        let start = if line_start >= cursor && text[line_start..start].trim().is_empty() {
            line_start
        } else {
            start
        };

        // Rest of the last line (usually just the newline) belongs to it too,
        // unless the next symbol starts on the same line
        let next_start = top[position + 1..]
            .iter()
            .map(|&(s, _, _)| s)
            .find(|&s| s >= end)
            .unwrap_or(text.len());
        let end = if text.as_bytes()[end - 1] == b'\n' {
            end
        } else {
            let line_end = text[end..]
                .find('\n')
                .map(|i| end + i + 1)
                .unwrap_or(text.len());
            line_end.min(next_start).max(end)
        };

        if start > cursor {
            // Blank lines right after a symbol stay with it
            let mut gap_start = cursor;
            if let Some(previous) = segments.last_mut() {
                gap_start += blank_prefix_len(&text[cursor..start]);
                previous.end = gap_start;
            }
            if gap_start < start {
                segments.push(Segment {
                    start: gap_start,
                    end: start,
                    symbol: None,
                });
            }
        }
        segments.push(Segment {
            start,
            end,
            symbol: Some(index),
        });
        cursor = end;
    }

    if cursor < text.len() {
        segments.push(Segment {
            start: cursor,
            end: text.len(),
            symbol: None,
        });
    }

    segments
}

/// Length of the leading run of whitespace-only lines
fn blank_prefix_len(text: &str) -> usize {
    text.split_inclusive('\n')
        .take_while(|line| line.ends_with('\n') && line.trim().is_empty())
        .map(str::len)
        .sum()
}

/// Fold whitespace-only gaps into the preceding segment, or the following one
/// at the start of the file
fn merge_blank_segments(text: &str, segments: Vec<Segment>) -> Vec<Segment> {
    let mut merged: Vec<Segment> = Vec::with_capacity(segments.len());
    let mut carry: Option<usize> = None;

    for mut segment in segments {
        let blank = segment.symbol.is_none() && text[segment.start..segment.end].trim().is_empty();

        if let Some(start) = carry.take() {
            segment.start = start;
        }

        if blank {
            match merged.last_mut() {
                Some(previous) => previous.end = segment.end,
                None => carry = Some(segment.start),
            }
            continue;
        }
        merged.push(segment);
    }

    // Whitespace-only file
    if let Some(start) = carry {
        merged.push(Segment {
            start,
            end: text.len(),
            symbol: None,
        });
    }

    merged
}

/// Byte offsets of line starts
struct LineIndex {
    starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self {
            starts,
            len: text.len(),
        }
    }

    /// 1-based line containing the byte
    fn line_of(&self, byte: usize) -> usize {
        self.starts.partition_point(|&s| s <= byte)
    }

    fn start_of_line_containing(&self, byte: usize) -> usize {
        self.starts[self.line_of(byte) - 1]
    }

    /// Split `[start, end)` after every `n` line breaks
    fn windows_raw(&self, start: usize, end: usize, n: usize) -> Vec<(usize, usize)> {
        let mut ranges = Vec::new();
        let mut window_start = start;
        let mut line = self.line_of(start);

        while window_start < end {
            // Start of the line n lines further down
            let window_end = self
                .starts
                .get(line + n - 1)
                .copied()
                .filter(|&b| b < end)
                .unwrap_or(end);
            ranges.push((window_start, window_end));
            window_start = window_end;
            line += n;
        }

        ranges
    }

    fn windows(&self, start: usize, end: usize, n: usize) -> Vec<Segment> {
        debug_assert!(end <= self.len);
        self.windows_raw(start, end, n)
            .into_iter()
            .map(|(start, end)| Segment {
                start,
                end,
                symbol: None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::ast_parser::{ParseBackend, TreeSitterBackend};
    use crate::indexer::language::Language;
    use std::path::PathBuf;

    fn source_file(path: &str, language: Option<Language>, content: &str) -> SourceFile {
        SourceFile {
            path: PathBuf::from(path),
            relative_path: path.to_string(),
            extension: path.rsplit_once('.').map(|(_, e)| e.to_string()),
            language,
            content: content.to_string(),
            content_hash: fingerprint(content.as_bytes()),
            size: content.len() as u64,
            modified_at: 0,
            lossy: false,
            priority: 0,
        }
    }

    fn chunk_python(chunker: &CodeChunker, content: &str) -> Vec<CodeChunk> {
        let file = source_file("a.py", Some(Language::Python), content);
        let parsed = TreeSitterBackend::for_language(Language::Python)
            .unwrap()
            .parse(content)
            .unwrap();
        chunker.chunk_file(&file, Some(&parsed))
    }

    fn concat(chunks: &[CodeChunk]) -> String {
        chunks.iter().map(|c| c.content.as_str()).collect()
    }

    fn assert_contiguous(chunks: &[CodeChunk], content: &str) {
        assert_eq!(concat(chunks), content);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end_byte, pair[1].start_byte);
        }
    }

    #[test]
    fn test_fixed_lines_chunking() {
        let content = (1..=100).map(|i| format!("line {}", i)).collect::<Vec<_>>().join("\n");
        let file = source_file("test.txt", Some(Language::Text), &content);

        let chunker = CodeChunker::new(ChunkStrategy::FixedLines(10));
        let chunks = chunker.chunk_file(&file, None);

        assert_eq!(chunks.len(), 10);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 10);
        assert_eq!(chunks[9].start_line, 91);
        assert_eq!(chunks[9].end_line, 100);
        assert_eq!(chunks[0].id.as_str(), "test.txt#L1");
        assert_eq!(chunks[9].id.as_str(), "test.txt#L10");
        assert_contiguous(&chunks, &content);
    }

    #[test]
    fn test_empty_file_has_no_chunks() {
        let file = source_file("empty.py", Some(Language::Python), "");
        assert!(CodeChunker::default().chunk_file(&file, None).is_empty());
    }

    #[test]
    fn test_single_function_is_one_chunk() {
        let content = "def f(x):\n    y = x + 1\n    if y > 2:\n        return y\n    return 0\n\n\n";
        let chunks = chunk_python(&CodeChunker::default(), content);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id.as_str(), "a.py#f");
        assert_eq!(chunks[0].symbol.as_deref(), Some("f"));
        assert_eq!(chunks[0].context, "a.py > f");
        assert_eq!(chunks[0].start_line, 1);
        assert_contiguous(&chunks, content);
    }

    #[test]
    fn test_gaps_between_symbols_become_line_chunks() {
        let content = "import os\nimport sys\n\ndef a():\n    return 1\n\nVALUE = 3\n\nclass B:\n    def m(self):\n        return a()\n";
        let chunks = chunk_python(&CodeChunker::default(), content);
        let ids: Vec<_> = chunks.iter().map(|c| c.id.as_str()).collect();

        assert_eq!(ids, vec!["a.py#L1", "a.py#a", "a.py#L2", "a.py#B"]);
        assert_eq!(chunks[0].content, "import os\nimport sys\n\n");
        assert_eq!(chunks[2].content, "VALUE = 3\n\n");
        assert_contiguous(&chunks, content);
    }

    #[test]
    fn test_leading_blank_lines_merge_forward() {
        let content = "\n\ndef f():\n    pass\n";
        let chunks = chunk_python(&CodeChunker::default(), content);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_byte, 0);
        assert_eq!(chunks[0].id.as_str(), "a.py#f");
        assert_contiguous(&chunks, content);
    }

    #[test]
    fn test_oversized_symbol_is_split_into_parts() {
        let mut content = String::from("def big():\n");
        for i in 0..30 {
            content.push_str(&format!("    x{} = {}\n", i, i));
        }
        let chunker = CodeChunker::new(ChunkStrategy::SymbolAligned {
            max_lines: 10,
            window_lines: 8,
        });
        let chunks = chunk_python(&chunker, &content);

        assert_eq!(chunks.len(), 4);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.id.as_str(), format!("a.py#big@{}", i + 1));
            assert_eq!(chunk.owner_symbol.as_deref(), Some("big"));
            assert_eq!(chunk.part, Some(i + 1));
            assert!(chunk.symbol.is_none());
        }
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 8);
        assert_eq!(chunks[3].end_line, 31);
        assert_contiguous(&chunks, &content);
    }

    #[test]
    fn test_duplicate_names_get_suffix() {
        let content = "def f():\n    return 1\n\ndef f():\n    return 2\n";
        let chunks = chunk_python(&CodeChunker::default(), content);
        let ids: Vec<_> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a.py#f", "a.py#f~2"]);
    }

    #[test]
    fn test_unparsed_file_uses_windows() {
        let content = (1..=120).map(|i| format!("echo {}\n", i)).collect::<String>();
        let file = source_file("run.sh", Some(Language::Shell), &content);
        let chunks = CodeChunker::default().chunk_file(&file, None);

        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.symbol.is_none()));
        assert_eq!(chunks[2].start_line, 101);
        assert_eq!(chunks[2].end_line, 120);
        assert_contiguous(&chunks, &content);
    }

    #[test]
    fn test_identical_text_identical_fingerprint() {
        let content = "def f():\n    return 1\n";
        let first = chunk_python(&CodeChunker::default(), content);
        let second = chunk_python(&CodeChunker::default(), content);
        assert_eq!(first[0].fingerprint, second[0].fingerprint);
        assert_eq!(first[0].id, second[0].id);
    }

    #[test]
    fn test_chunk_at_offset() {
        let content = "import os\n\ndef a():\n    return 1\n";
        let chunks = chunk_python(&CodeChunker::default(), content);
        assert_eq!(chunk_at_offset(&chunks, 0).unwrap().id.as_str(), "a.py#L1");
        let def_offset = content.find("def").unwrap();
        assert_eq!(chunk_at_offset(&chunks, def_offset).unwrap().id.as_str(), "a.py#a");
        assert!(chunk_at_offset(&chunks, content.len()).is_none());
    }

    #[test]
    fn test_signature_reflects_strategy() {
        assert_eq!(CodeChunker::default().signature(), "symbol:120:50");
        assert_eq!(CodeChunker::new(ChunkStrategy::FixedLines(40)).signature(), "lines:40");
    }
}
