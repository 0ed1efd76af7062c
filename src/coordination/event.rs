/// Change notification delivered on a child-watch stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEvent {
    /// Absolute path of the node that changed
    pub path: String,
    pub kind: NodeEventKind,
    /// Node payload after the change; `None` for [`NodeEventKind::Deleted`]
    pub data: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEventKind {
    Created,
    DataChanged,
    Deleted,
}
