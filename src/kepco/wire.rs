//! Request and response shapes of the KEPCO address endpoints.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{LookupError, LookupResult};
use crate::models::AddressLevel;

pub const PATH_ADDR_INIT: &str = "/ew/cpct/retrieveAddrInit";
pub const PATH_ADDR_GBN: &str = "/ew/cpct/retrieveAddrGbn";

pub const SUBMISSION_ADDR_INIT: &str = "mf_wfm_layout_sbm_retrieveAddrInit";
pub const SUBMISSION_ADDR_GBN: &str = "mf_wfm_layout_sbm_retrieveAddrGbn";

/// Row list returned by `retrieveAddrInit`
pub const PROVINCE_LIST_KEY: &str = "dlt_sido";
/// Row list returned by `retrieveAddrGbn`
pub const LEVEL_LIST_KEY: &str = "dlt_addrGbn";

/// Body of a `retrieveAddrGbn` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteQuery {
    #[serde(rename = "dma_addrGbn")]
    pub params: AddrGbnParams,
}

/// Every key is always present; levels that are not part of the request are
/// sent as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AddrGbnParams {
    pub gbn: u8,
    pub addr_do: String,
    pub addr_si: String,
    pub addr_gu: String,
    pub addr_lidong: String,
    pub addr_li: String,
    pub addr_jibun: String,
}

impl RemoteQuery {
    /// Build the query for `level` from the values of every level before it
    pub fn new(level: AddressLevel, ancestors: &[String]) -> LookupResult<Self> {
        let gbn = level.gbn().ok_or_else(|| {
            LookupError::Config(format!("{} has no level discriminator", level))
        })?;
        if ancestors.len() != level.index() {
            return Err(LookupError::IncompleteAncestors(level));
        }

        let mut params = AddrGbnParams {
            gbn,
            ..Default::default()
        };
        for (ancestor, value) in level.ancestors().iter().zip(ancestors) {
            let slot = match ancestor {
                AddressLevel::Province => &mut params.addr_do,
                AddressLevel::City => &mut params.addr_si,
                AddressLevel::District => &mut params.addr_gu,
                AddressLevel::Town => &mut params.addr_lidong,
                AddressLevel::Village => &mut params.addr_li,
                AddressLevel::Lot => &mut params.addr_jibun,
            };
            *slot = value.clone();
        }
        Ok(Self { params })
    }

    pub fn level(&self) -> Option<AddressLevel> {
        AddressLevel::all()
            .iter()
            .find(|l| l.gbn() == Some(self.params.gbn))
            .copied()
    }
}

/// Raw JSON object returned by the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteResponse(Map<String, Value>);

impl RemoteResponse {
    pub fn from_value(endpoint: &str, value: Value) -> LookupResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(LookupError::Upstream {
                endpoint: endpoint.to_string(),
                reason: format!("expected a JSON object, got {}", json_kind(&other)),
            }),
        }
    }

    /// Object rows under `list_key`; anything that is not an object is skipped
    pub fn rows<'a>(&'a self, list_key: &str) -> impl Iterator<Item = &'a Map<String, Value>> {
        self.0
            .get(list_key)
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object)
    }

    /// Displayable values of `field` across every row.
    ///
    /// Strings are taken as-is, numbers and booleans are stringified, anything
    /// else (null, missing, nested) is skipped.
    pub fn field_values(&self, list_key: &str, field: &str) -> Vec<String> {
        self.rows(list_key)
            .filter_map(|row| match row.get(field)? {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            })
            .collect()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
