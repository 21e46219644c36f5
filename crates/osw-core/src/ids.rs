use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }
            pub fn from_str(s: impl Into<String>) -> Self {
                Self(s.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }
    };
}

id_newtype!(ChangeId);
id_newtype!(AttemptId);

impl ChangeId {
    /// A change id doubles as a directory name and checkpoint file stem,
    /// so it must stay within a conservative character set.
    pub fn validate(&self) -> Result<(), String> {
        if self.0.is_empty() {
            return Err("change id must not be empty".to_string());
        }
        if !self
            .0
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(format!(
                "change id '{}' may only contain [a-zA-Z0-9_-]",
                self.0
            ));
        }
        Ok(())
    }
}
