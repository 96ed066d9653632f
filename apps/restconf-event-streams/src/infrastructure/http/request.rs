//! HTTP request parsing: operation bodies and subscribe query parameters.

use axum::body::Bytes;
use serde::de::DeserializeOwned;

use crate::application::services::RpcRequest;
use crate::domain::error::{ErrorTag, ErrorType, RestconfError};
use crate::domain::params::TextParameters;

/// Decode a `{"input": {...}}` operation body.
///
/// # Errors
///
/// `malformed-message` when the body is not a JSON document of that shape.
pub fn parse_rpc_input<T: DeserializeOwned>(body: &Bytes) -> Result<T, RestconfError> {
    serde_json::from_slice::<RpcRequest<T>>(body)
        .map(|request| request.input)
        .map_err(|e| {
            RestconfError::new(
                ErrorType::Protocol,
                ErrorTag::MalformedMessage,
                format!("error parsing input: {e}"),
            )
        })
}

/// Options a subscriber passes on the subscribe URI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Rendering switches.
    pub params: TextParameters,
    /// XPath filter expression.
    pub filter: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum QueryParam {
    Filter,
    PrettyPrint,
    SkipData,
    LeafNodesOnly,
    ChangedLeafNodesOnly,
    ChildNodesOnly,
}

impl QueryParam {
    fn parse(name: &str) -> Result<Self, RestconfError> {
        match name {
            "filter" => Ok(Self::Filter),
            "pretty-print" => Ok(Self::PrettyPrint),
            "odl-skip-notification-data" | "skip-notification-data" => Ok(Self::SkipData),
            "odl-leaf-nodes-only" | "leaf-nodes-only" => Ok(Self::LeafNodesOnly),
            "changed-leaf-nodes-only" => Ok(Self::ChangedLeafNodesOnly),
            "child-nodes-only" => Ok(Self::ChildNodesOnly),
            "start-time" | "stop-time" => Err(RestconfError::new(
                ErrorType::Protocol,
                ErrorTag::OperationNotSupported,
                "replay is not supported",
            )),
            other => Err(RestconfError::new(
                ErrorType::Protocol,
                ErrorTag::UnknownAttribute,
                format!("unknown query parameter '{other}'"),
            )),
        }
    }
}

impl SubscribeOptions {
    /// Build options from decoded query pairs.
    ///
    /// # Errors
    ///
    /// `invalid-value` for a repeated parameter, a non-boolean switch, or more
    /// than one of the entry-shaping switches (`leaf-nodes-only`,
    /// `changed-leaf-nodes-only`, `child-nodes-only`) turned on;
    /// `operation-not-supported` for replay parameters, and
    /// `unknown-attribute` for anything else unrecognized.
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self, RestconfError> {
        let mut seen: Vec<QueryParam> = Vec::with_capacity(pairs.len());
        let mut filter = None;
        let (mut pretty_print, mut skip_data, mut leaf_nodes_only) = (false, false, false);
        let (mut changed_leaf_nodes_only, mut child_nodes_only) = (false, false);

        for (name, value) in pairs {
            let param = QueryParam::parse(name)?;
            if seen.contains(&param) {
                return Err(RestconfError::new(
                    ErrorType::Protocol,
                    ErrorTag::InvalidValue,
                    format!("parameter '{name}' can appear at most once"),
                ));
            }
            seen.push(param);

            match param {
                QueryParam::Filter => filter = Some(value.clone()),
                QueryParam::PrettyPrint => pretty_print = parse_bool(name, value)?,
                QueryParam::SkipData => skip_data = parse_bool(name, value)?,
                QueryParam::LeafNodesOnly => leaf_nodes_only = parse_bool(name, value)?,
                QueryParam::ChangedLeafNodesOnly => {
                    changed_leaf_nodes_only = parse_bool(name, value)?;
                }
                QueryParam::ChildNodesOnly => child_nodes_only = parse_bool(name, value)?,
            }
        }

        let shaping = [leaf_nodes_only, changed_leaf_nodes_only, child_nodes_only];
        if shaping.iter().filter(|on| **on).count() > 1 {
            return Err(RestconfError::new(
                ErrorType::Protocol,
                ErrorTag::InvalidValue,
                "leaf-nodes-only, changed-leaf-nodes-only and child-nodes-only are mutually exclusive",
            ));
        }

        Ok(Self {
            params: TextParameters::new(pretty_print, skip_data, leaf_nodes_only)
                .with_changed_leaf_nodes_only(changed_leaf_nodes_only)
                .with_child_nodes_only(child_nodes_only),
            filter,
        })
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, RestconfError> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(RestconfError::new(
            ErrorType::Protocol,
            ErrorTag::InvalidValue,
            format!("invalid value '{other}' for parameter '{name}', expected true or false"),
        )),
    }
}
