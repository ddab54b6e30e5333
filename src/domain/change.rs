use std::fmt;

/// Item flag that is tracked for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    Unread,
    Starred,
}

impl Flag {
    pub(crate) fn column(self) -> &'static str {
        match self {
            Flag::Unread => "unread",
            Flag::Starred => "starred",
        }
    }

    pub(crate) fn changed_column(self) -> &'static str {
        match self {
            Flag::Unread => "unread_changed",
            Flag::Starred => "starred_changed",
        }
    }
}

/// A kind of local change waiting to be uploaded.
///
/// Each action is defined by the flag it touches and the value the flag must
/// hold: `MarkRead` selects items with `unread_changed = true AND unread = false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkAction {
    MarkRead,
    MarkUnread,
    MarkStarred,
    MarkUnstarred,
}

impl MarkAction {
    pub const ALL: [MarkAction; 4] = [
        MarkAction::MarkRead,
        MarkAction::MarkUnread,
        MarkAction::MarkStarred,
        MarkAction::MarkUnstarred,
    ];

    pub fn flag(self) -> Flag {
        match self {
            MarkAction::MarkRead | MarkAction::MarkUnread => Flag::Unread,
            MarkAction::MarkStarred | MarkAction::MarkUnstarred => Flag::Starred,
        }
    }

    /// Value of [`flag`](Self::flag) on items this action uploads.
    pub fn value(self) -> bool {
        matches!(self, MarkAction::MarkUnread | MarkAction::MarkStarred)
    }
}

impl fmt::Display for MarkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MarkAction::MarkRead => "mark read",
            MarkAction::MarkUnread => "mark unread",
            MarkAction::MarkStarred => "mark starred",
            MarkAction::MarkUnstarred => "mark unstarred",
        };
        f.write_str(name)
    }
}
