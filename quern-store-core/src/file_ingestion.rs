use std::fmt;

/// How a file's contents were fingerprinted when it entered the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FileIngestionMethod {
    /// Plain file contents.
    Flat,
    /// Contents serialized as a NAR first.
    Recursive,
}

impl FileIngestionMethod {
    pub fn is_recursive(&self) -> bool {
        matches!(self, FileIngestionMethod::Recursive)
    }

    /// The `r:` marker inside content-address descriptors.
    pub fn descriptor_infix(&self) -> &'static str {
        match self {
            FileIngestionMethod::Flat => "",
            FileIngestionMethod::Recursive => "r:",
        }
    }
}

impl fmt::Display for FileIngestionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileIngestionMethod::Flat => "flat",
            FileIngestionMethod::Recursive => "recursive",
        })
    }
}
