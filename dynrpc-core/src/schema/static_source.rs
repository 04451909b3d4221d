//! Schema source backed by `.proto` files compiled in process.
use super::{SchemaError, SchemaNode, lookup_symbol, method_names};
use crate::fs::expand_home;
use prost_reflect::{DescriptorPool, FileDescriptor};
use std::path::PathBuf;

/// An immutable set of compiled files, in the order they were requested.
#[derive(Debug, Clone)]
pub struct StaticSource {
    pool: DescriptorPool,
    files: Vec<FileDescriptor>,
}

impl StaticSource {
    /// Compiles `proto_files`, resolving imports against `import_paths` (the current directory
    /// when none is given). A leading `~` in any path is expanded to the home directory.
    pub fn compile<P: AsRef<str>>(
        import_paths: &[P],
        proto_files: &[P],
    ) -> Result<Self, SchemaError> {
        let mut includes = expand_all(import_paths)?;
        if includes.is_empty() {
            includes.push(PathBuf::from("."));
        }
        let paths = expand_all(proto_files)?;

        let mut compiler = protox::Compiler::new(includes).map_err(SchemaError::CompileFailed)?;
        // Imports enter the pool before their importers, so the requested order is kept aside.
        let mut names: Vec<String> = Vec::with_capacity(paths.len());
        for path in &paths {
            let name = compiler
                .open_file(path)
                .map_err(SchemaError::CompileFailed)?
                .name()
                .to_string();
            if !names.contains(&name) {
                names.push(name);
            }
        }

        let pool = compiler.descriptor_pool();
        let files = names
            .iter()
            .filter_map(|name| pool.get_file_by_name(name))
            .collect();

        let requested: Vec<&str> = proto_files.iter().map(|file| file.as_ref()).collect();
        tracing::debug!(files = ?requested, "compiled proto files");

        Ok(Self { pool, files })
    }

    /// Uses an already compiled, binary encoded `FileDescriptorSet`. Every file in the set is
    /// considered requested.
    pub fn from_file_descriptor_set(bytes: &[u8]) -> Result<Self, SchemaError> {
        let pool = DescriptorPool::decode(bytes)?;
        let files = pool.files().collect();
        Ok(Self { pool, files })
    }

    pub fn list_services(&self) -> Vec<String> {
        self.files
            .iter()
            .flat_map(|file| file.services())
            .map(|service| service.full_name().to_string())
            .collect()
    }

    pub fn list_methods(&self) -> Vec<String> {
        self.files
            .iter()
            .flat_map(|file| file.services())
            .flat_map(|service| method_names(&service).collect::<Vec<_>>())
            .collect()
    }

    pub fn find_symbol(&self, name: &str) -> Result<SchemaNode, SchemaError> {
        lookup_symbol(&self.pool, name).ok_or_else(|| SchemaError::SymbolNotFound(name.to_string()))
    }
}

fn expand_all<P: AsRef<str>>(paths: &[P]) -> Result<Vec<PathBuf>, SchemaError> {
    paths
        .iter()
        .map(|path| expand_home(path.as_ref()).map_err(SchemaError::from))
        .collect()
}
