//! Source registry and locations.
//!
//! Every loaded module gets a stable [`ModuleId`]; a [`ModuleLoc`] is that id
//! plus a byte offset into the module's source. Line and column numbers are
//! not stored anywhere in the tree - they are computed on demand from a
//! per-module table of line start offsets, which keeps locations at eight
//! bytes and makes them `Copy`.

/// Index of a loaded module inside the [`SourceMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u32);

impl ModuleId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index.try_into().expect("too many modules"))
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A position in a loaded module: `(module, byte offset)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleLoc {
    pub module: ModuleId,
    pub offset: u32,
}

impl ModuleLoc {
    pub(crate) fn new(module: ModuleId, offset: usize) -> Self {
        Self {
            module,
            offset: offset.try_into().expect("source file exceeds u32 offsets"),
        }
    }
}

struct SourceFile {
    path: String,
    /// Byte offset of the first character of each line.
    line_starts: Vec<u32>,
}

/// Interned source paths plus the line tables needed to render locations.
#[derive(Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    /// Registers a module's path and source text, returning its id.
    pub(crate) fn add(&mut self, path: &str, code: &str) -> ModuleId {
        let mut line_starts = vec![0u32];
        for (i, b) in code.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push((i + 1) as u32);
            }
        }
        let id = ModuleId::new(self.files.len());
        self.files.push(SourceFile {
            path: path.to_owned(),
            line_starts,
        });
        id
    }

    pub fn path(&self, module: ModuleId) -> &str {
        &self.files[module.index()].path
    }

    /// 1-based line and column for a location.
    pub fn line_col(&self, loc: ModuleLoc) -> (usize, usize) {
        let starts = &self.files[loc.module.index()].line_starts;
        let line = match starts.binary_search(&loc.offset) {
            Ok(exact) => exact,
            Err(after) => after - 1,
        };
        let col = loc.offset - starts[line];
        (line + 1, col as usize + 1)
    }

    /// Renders a location as `path:line:col`.
    pub fn loc_str(&self, loc: ModuleLoc) -> String {
        let (line, col) = self.line_col(loc);
        format!("{}:{line}:{col}", self.path(loc.module))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col_lookup() {
        let mut map = SourceMap::default();
        let id = map.add("a.sc", "let x = 1;\nlet y = 2;\n");
        assert_eq!(map.line_col(ModuleLoc::new(id, 0)), (1, 1));
        assert_eq!(map.line_col(ModuleLoc::new(id, 4)), (1, 5));
        assert_eq!(map.line_col(ModuleLoc::new(id, 11)), (2, 1));
        assert_eq!(map.loc_str(ModuleLoc::new(id, 15)), "a.sc:2:5");
    }
}
