use serde::Serialize;

/// Index of a record inside its [`CallTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId(usize);

/// One executed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    pub operation: String,
    /// Source text of the directive that started the frame; `None` at the top.
    pub operation_src: Option<String>,
    pub file: String,
    pub ctx_file: Option<String>,
    /// History handle recorded when the document was first seen.
    pub md_commit: Option<String>,
    /// History handle recorded when the frame finished.
    pub ctx_commit: Option<String>,
    pub parent: Option<RecordId>,
    pub children: Vec<RecordId>,
}

/// Arena holding every frame executed by one interpreter, in start order.
#[derive(Debug, Clone, Default)]
pub struct CallTree {
    records: Vec<CallRecord>,
}

impl CallTree {
    pub fn new() -> Self {
        CallTree::default()
    }

    /// Open a record for `file`, linked under `parent` when given.
    pub fn open(&mut self, file: impl Into<String>, operation_src: Option<String>, parent: Option<RecordId>) -> RecordId {
        let id = RecordId(self.records.len());
        self.records.push(CallRecord {
            operation: "@run".to_string(),
            operation_src,
            file: file.into(),
            ctx_file: None,
            md_commit: None,
            ctx_commit: None,
            parent,
            children: Vec::new(),
        });
        if let Some(record) = parent.and_then(|p| self.records.get_mut(p.0)) {
            record.children.push(id);
        }
        id
    }

    pub fn get(&self, id: RecordId) -> Option<&CallRecord> {
        self.records.get(id.0)
    }

    pub fn get_mut(&mut self, id: RecordId) -> Option<&mut CallRecord> {
        self.records.get_mut(id.0)
    }

    pub fn roots(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.parent.is_none())
            .map(|(i, _)| RecordId(i))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Nested JSON for every root frame. A single root is emitted as an
    /// object, several as an array.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut roots: Vec<_> = self.roots().filter_map(|id| self.view(id)).collect();
        if roots.len() == 1 {
            serde_json::to_string_pretty(&roots.remove(0))
        } else {
            serde_json::to_string_pretty(&roots)
        }
    }

    fn view(&self, id: RecordId) -> Option<RecordView<'_>> {
        let record = self.get(id)?;
        Some(RecordView {
            operation: &record.operation,
            operation_src: record.operation_src.as_deref(),
            filename: &record.file,
            ctx_file: record.ctx_file.as_deref(),
            md_commit_hash: record.md_commit.as_deref(),
            ctx_commit_hash: record.ctx_commit.as_deref(),
            children: record.children.iter().filter_map(|c| self.view(*c)).collect(),
        })
    }
}

#[derive(Serialize)]
struct RecordView<'a> {
    operation: &'a str,
    operation_src: Option<&'a str>,
    filename: &'a str,
    ctx_file: Option<&'a str>,
    md_commit_hash: Option<&'a str>,
    ctx_commit_hash: Option<&'a str>,
    children: Vec<RecordView<'a>>,
}
