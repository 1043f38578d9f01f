use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(PostId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleAction {
    Follow,
    Like,
}

/// Identity of a toggleable social action: the entity plus the action class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "action", content = "target", rename_all = "snake_case")]
pub enum ToggleKey {
    Follow(UserId),
    Like(PostId),
}

impl ToggleKey {
    pub fn action(&self) -> ToggleAction {
        match self {
            ToggleKey::Follow(_) => ToggleAction::Follow,
            ToggleKey::Like(_) => ToggleAction::Like,
        }
    }

    pub fn target_id(&self) -> i64 {
        match self {
            ToggleKey::Follow(user_id) => user_id.0,
            ToggleKey::Like(post_id) => post_id.0,
        }
    }
}

impl fmt::Display for ToggleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToggleKey::Follow(user_id) => write!(f, "follow:{user_id}"),
            ToggleKey::Like(post_id) => write!(f, "like:{post_id}"),
        }
    }
}
