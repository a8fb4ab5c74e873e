//! Per-method authorization policy.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::auth::Identity;
use crate::rpc::error::{Error, ERR_FORBIDDEN, ERR_UNAUTHORIZED};

/// Privilege group, ordered from least to most privileged.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    #[default]
    Custom,
    User,
    Admin,
    System,
}

/// What a method demands of its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// No identity needed.
    Skip,
    /// An identity of at least this group.
    AtLeast(Group),
}

/// Method → requirement table. Unlisted methods require any identity.
#[derive(Debug, Clone, Default)]
pub struct Guards {
    rules: HashMap<String, Requirement>,
}

impl Guards {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let `methods` through regardless of authentication.
    pub fn skip<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for method in methods {
            self.rules.insert(method.into(), Requirement::Skip);
        }
        self
    }

    /// Require at least `group` for `methods`.
    pub fn guard<I, S>(mut self, group: Group, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for method in methods {
            self.rules.insert(method.into(), Requirement::AtLeast(group));
        }
        self
    }

    pub fn requirement(&self, method: &str) -> Requirement {
        self.rules
            .get(method)
            .copied()
            .unwrap_or(Requirement::AtLeast(Group::Custom))
    }

    /// Check `identity` against the requirement of `method`.
    pub fn authorize(&self, method: &str, identity: Option<&Identity>) -> Result<(), Error> {
        match self.requirement(method) {
            Requirement::Skip => Ok(()),
            Requirement::AtLeast(group) => match identity {
                None => Err(ERR_UNAUTHORIZED),
                Some(user) if user.group < group => Err(ERR_FORBIDDEN),
                Some(_) => Ok(()),
            },
        }
    }
}
