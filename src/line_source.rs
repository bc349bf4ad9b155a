use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str;

use flate2::bufread::MultiGzDecoder;

use crate::error::{CountError, ParseError};

const READ_BUFFER_SIZE: usize = 64 * 1024;
const APPROX_LINE_LEN: usize = 64;

/// One raw input line without its terminator.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    /// 1-based position in the file
    pub number: usize,
    pub bytes: Vec<u8>,
}

impl Line {
    pub fn as_str(&self) -> Result<&str, ParseError> {
        str::from_utf8(&self.bytes).map_err(|_| ParseError::InvalidUtf8)
    }
}

/// Lazy, non-restartable sequence of lines of one file.
///
/// Files ending in `.gz` are decompressed on the fly. After the first error
/// the source is exhausted.
pub struct LineSource {
    path: PathBuf,
    reader: Box<dyn BufRead + Send>,
    compressed: bool,
    line_number: usize,
    done: bool,
}

pub fn is_compressed(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "gz")
}

impl LineSource {
    pub fn open(path: &Path) -> Result<Self, CountError> {
        let file = File::open(path).map_err(|source| CountError::Io {
            path: path.to_owned(),
            source,
        })?;
        let compressed = is_compressed(path);
        let reader: Box<dyn BufRead + Send> = if compressed {
            let decoder = MultiGzDecoder::new(BufReader::with_capacity(READ_BUFFER_SIZE, file));
            Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, decoder))
        } else {
            Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, file))
        };
        Ok(Self::from_reader(path, reader, compressed))
    }

    pub fn from_reader(path: &Path, reader: Box<dyn BufRead + Send>, compressed: bool) -> Self {
        LineSource {
            path: path.to_owned(),
            reader,
            compressed,
            line_number: 0,
            done: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn classify(&self, source: io::Error) -> CountError {
        let path = self.path.clone();
        let codec_error = matches!(
            source.kind(),
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof
        );
        if self.compressed && codec_error {
            CountError::Decompression { path, source }
        } else {
            CountError::Io { path, source }
        }
    }
}

impl Iterator for LineSource {
    type Item = Result<Line, CountError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut bytes = Vec::with_capacity(APPROX_LINE_LEN);
        match self.reader.read_until(b'\n', &mut bytes) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(_) => {
                if bytes.last() == Some(&b'\n') {
                    bytes.pop();
                    if bytes.last() == Some(&b'\r') {
                        bytes.pop();
                    }
                }
                self.line_number += 1;
                Some(Ok(Line {
                    number: self.line_number,
                    bytes,
                }))
            }
            Err(e) => {
                self.done = true;
                Some(Err(self.classify(e)))
            }
        }
    }
}
