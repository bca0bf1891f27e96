/// A reference to a block by `/`-separated id-or-key path.
/// `nested` is set when the expression ended in `/*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRef {
    pub path: String,
    pub nested: bool,
}

impl BlockRef {
    pub fn new(path: impl Into<String>, nested: bool) -> Self {
        BlockRef {
            path: path.into(),
            nested,
        }
    }
}

/// One block reference or an ordered collection of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockSelection {
    Single(BlockRef),
    Multi(Vec<BlockRef>),
}

impl BlockSelection {
    pub fn is_multi(&self) -> bool {
        matches!(self, BlockSelection::Multi(_))
    }

    /// References in declaration order.
    pub fn refs(&self) -> &[BlockRef] {
        match self {
            BlockSelection::Single(r) => std::slice::from_ref(r),
            BlockSelection::Multi(refs) => refs,
        }
    }
}

/// A file location split into its folder and file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    /// Folder components joined by `/`; empty for the current folder.
    pub folder: String,
    pub file: String,
}

impl FileRef {
    /// The relative path `folder/file`.
    pub fn relative(&self) -> String {
        if self.folder.is_empty() {
            self.file.clone()
        } else {
            format!("{}/{}", self.folder, self.file)
        }
    }
}

/// Output of the `path` processor: a file plus an optional block inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePath {
    pub file: FileRef,
    pub block: Option<BlockRef>,
}

/// A scalar classified as either literal text or a block reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    Literal(String),
    Block(BlockRef),
}
