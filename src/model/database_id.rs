use crate::constants::DEFAULT_DATABASE_ID;
use crate::error::{invalid_argument, FirestoreResult};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DatabaseId {
    project_id: String,
    database: String,
}

impl DatabaseId {
    pub fn new(project_id: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database: database.into(),
        }
    }

    pub fn default(project_id: impl Into<String>) -> Self {
        Self::new(project_id, DEFAULT_DATABASE_ID)
    }

    /// Parses `projects/{project}/databases/{database}`.
    pub fn from_name(name: &str) -> FirestoreResult<Self> {
        let segments: Vec<_> = name.trim_matches('/').split('/').collect();
        if segments.len() == 4
            && segments[0] == "projects"
            && segments[2] == "databases"
            && !segments[1].is_empty()
            && !segments[3].is_empty()
        {
            return Ok(Self::new(segments[1], segments[3]));
        }
        Err(invalid_argument(
            "Database identifier must follow projects/{project}/databases/{database}",
        ))
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn with_database(&self, database: impl Into<String>) -> Self {
        Self::new(self.project_id.clone(), database)
    }

    /// `projects/{project}/databases/{database}`, the `database` field of RPC bodies.
    pub fn database_path(&self) -> String {
        format!("projects/{}/databases/{}", self.project_id, self.database)
    }

    /// `projects/{project}/databases/{database}/documents`, the prefix of every document path.
    pub fn documents_path(&self) -> String {
        format!("{}/documents", self.database_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_paths() {
        let db = DatabaseId::default("project");
        assert_eq!(db.database(), DEFAULT_DATABASE_ID);
        assert_eq!(db.database_path(), "projects/project/databases/(default)");
        assert_eq!(
            db.documents_path(),
            "projects/project/databases/(default)/documents"
        );
    }

    #[test]
    fn parses_full_name() {
        let db = DatabaseId::from_name("projects/project/databases/custom").unwrap();
        assert_eq!(db.project_id(), "project");
        assert_eq!(db.database(), "custom");
    }

    #[test]
    fn rejects_malformed_name() {
        let err = DatabaseId::from_name("projects/project/custom").unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-argument");
    }
}
