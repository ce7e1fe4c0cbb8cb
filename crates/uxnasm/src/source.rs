use std::collections::HashMap;
use std::io;

/// Where the assembler reads its entry file and `~path` includes from.
pub trait SourceLoader {
    fn load(&mut self, path: &str) -> io::Result<String>;
}

/// Reads paths from the filesystem as given, relative to the working
/// directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileLoader;

impl SourceLoader for FileLoader {
    fn load(&mut self, path: &str) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// Serves sources from memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryLoader {
    files: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, source: &str) -> Self {
        self.insert(path, source);
        self
    }

    pub fn insert(&mut self, path: &str, source: &str) {
        self.files.insert(String::from(path), String::from(source));
    }
}

impl SourceLoader for MemoryLoader {
    fn load(&mut self, path: &str) -> io::Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }
}
