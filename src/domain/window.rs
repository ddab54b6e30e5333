/// The two item windows kept for the reading UI.
///
/// The list window holds whatever the item list currently shows. The pager
/// window is a snapshot of it that stays stable while the user pages through
/// articles, even if a sync changes the list underneath.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    List,
    Pager,
}

impl WindowKind {
    pub fn id(self) -> i64 {
        match self {
            WindowKind::List => 0,
            WindowKind::Pager => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporaryFeed {
    pub id: i64,
    /// Id of the folder, feed or special folder the window was built from.
    pub tree_item_id: i64,
    pub name: String,
    pub item_ids: Vec<i64>,
}
