//! Farm model

use serde::{Deserialize, Serialize};

use super::ids::{FarmId, OwnerId};

/// Name given to farms provisioned automatically for an owner.
pub const DEFAULT_FARM_NAME: &str = "My Farm";

/// A farm, the group that owns fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Farm {
    pub id: FarmId,
    pub owner_id: OwnerId,
    pub name: String,
    #[serde(default)]
    pub size_unit: Option<String>,
}

/// Input for creating a farm
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewFarm {
    pub owner_id: OwnerId,
    pub name: String,
    pub size_unit: Option<String>,
}

impl NewFarm {
    /// The default farm provisioned for an owner with none.
    pub fn default_for(owner_id: OwnerId) -> Self {
        Self {
            owner_id,
            name: DEFAULT_FARM_NAME.to_string(),
            size_unit: Some(super::field::DEFAULT_SIZE_UNIT.to_string()),
        }
    }
}
