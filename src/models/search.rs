use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCriteria {
    All,
    LocationEquals(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOrder {
    Id,
    DateAdded,
    AbsolutePath,
}

impl FileOrder {
    pub fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::DateAdded => "date_added",
            Self::AbsolutePath => "absolute_path",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationOrder {
    Id,
    DateAdded,
    Path,
}

impl LocationOrder {
    pub fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::DateAdded => "date_added",
            Self::Path => "path",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl std::fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Asc => write!(f, "ASC"),
            Self::Desc => write!(f, "DESC"),
        }
    }
}
