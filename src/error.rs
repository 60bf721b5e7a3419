use thiserror::Error;

/// Context attached to a [`HfsError::Corrupt`] so a caller can diagnose
/// a structural violation without a debugger: which tree, which node,
/// which record within it.
#[derive(Debug, Clone, Default)]
pub struct CorruptContext {
    pub tree: Option<&'static str>,
    pub node: Option<u32>,
    pub record: Option<usize>,
}

impl CorruptContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tree(mut self, tree: &'static str) -> Self {
        self.tree = Some(tree);
        self
    }

    pub fn node(mut self, node: u32) -> Self {
        self.node = Some(node);
        self
    }

    pub fn record(mut self, record: usize) -> Self {
        self.record = Some(record);
        self
    }
}

impl std::fmt::Display for CorruptContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut wrote = false;
        if let Some(tree) = self.tree {
            write!(f, "tree={tree}")?;
            wrote = true;
        }
        if let Some(node) = self.node {
            write!(f, "{}node={node}", if wrote { ", " } else { "" })?;
            wrote = true;
        }
        if let Some(record) = self.record {
            write!(f, "{}record={record}", if wrote { ", " } else { "" })?;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum HfsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("corrupt data: {context} ({what})")]
    Corrupt { what: String, context: CorruptContext },

    #[error("unsupported: {what}")]
    Unsupported { what: String },

    #[error("invalid argument: {what}")]
    InvalidArgument { what: String },

    #[error("operation cancelled")]
    Cancelled,
}

impl HfsError {
    pub fn corrupt(what: impl Into<String>) -> Self {
        HfsError::Corrupt { what: what.into(), context: CorruptContext::new() }
    }

    pub fn corrupt_in(what: impl Into<String>, context: CorruptContext) -> Self {
        HfsError::Corrupt { what: what.into(), context }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        HfsError::NotFound { what: what.into() }
    }

    pub fn unsupported(what: impl Into<String>) -> Self {
        HfsError::Unsupported { what: what.into() }
    }

    pub fn invalid_argument(what: impl Into<String>) -> Self {
        HfsError::InvalidArgument { what: what.into() }
    }

    /// Not a directory is a recurring `InvalidArgument` shape used by path
    /// resolution when a non-terminal path component names a file.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        HfsError::InvalidArgument { what: format!("not a directory: {}", path.into()) }
    }
}

pub type Result<T> = std::result::Result<T, HfsError>;

/// A non-fatal condition encountered while scanning. Pushed onto a
/// caller-supplied accumulator instead of aborting the operation or
/// going to stderr, so every warning stays inspectable.
#[derive(Debug, Clone)]
pub enum Diagnostic {
    /// A catalog/attribute name's stored length exceeded 255 UTF-16 code
    /// units and was clamped.
    NameClamped { cnid: u32, stored_length: usize },
    /// A name's UTF-16 code units did not form valid text; replaced with
    /// a sentinel string.
    InvalidName { cnid: u32 },
}
