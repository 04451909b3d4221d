//! Where request messages are read from.
use anyhow::Context;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;

/// The source selected by the `--data` flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    Stdin,
    File(PathBuf),
    Literal(String),
}

impl DataSource {
    /// `-` or no flag reads stdin, `@path` reads a file, anything else is the data itself.
    pub fn parse(data: Option<&str>) -> Self {
        match data {
            None | Some("-") => DataSource::Stdin,
            Some(data) => match data.strip_prefix('@') {
                Some(path) => DataSource::File(PathBuf::from(path)),
                None => DataSource::Literal(data.to_string()),
            },
        }
    }

    pub fn open(self) -> anyhow::Result<Box<dyn Read + Send>> {
        Ok(match self {
            DataSource::Stdin => Box::new(io::stdin()),
            DataSource::File(path) => {
                let file = File::open(&path)
                    .with_context(|| format!("failed to open '{}'", path.display()))?;
                Box::new(BufReader::new(file))
            }
            DataSource::Literal(data) => Box::new(io::Cursor::new(data.into_bytes())),
        })
    }
}
