//! Declared API: parameters, functions, callbacks and properties.
//!
//! Everything the device answers to is listed in static tables. Each entry
//! carries a tag naming its handler, so dispatch is a `match` over the tag
//! rather than a table of function pointers.

use mdb_common::consts::{
    ADDRESS_ARRAY_LENGTH_MAX, ADDRESS_ARRAY_LENGTH_MIN, ADDRESS_MAX, ADDRESS_MIN, EPOCH_TIME_MAX,
    EPOCH_TIME_MIN, REQUEST_ARRAY_LENGTH_MAX, REQUEST_ARRAY_LENGTH_MIN, TIME_ZONE_OFFSET_MAX,
    TIME_ZONE_OFFSET_MIN,
};
use serde_json::{Value, json};

use super::ServerError;
use crate::forward::FORWARD_TO_ADDRESS;

// ─── Names ──────────────────────────────────────────────────────────

pub const GET_CLIENT_INFO: &str = "getClientInfo";
pub const SET_TIME: &str = "setTime";
pub const GET_TIME: &str = "getTime";
pub const ADJUST_TIME: &str = "adjustTime";
pub const NOW: &str = "now";
pub const GET_DEVICE_ID: &str = "getDeviceId";
pub const GET_DEVICE_INFO: &str = "getDeviceInfo";
pub const GET_API: &str = "getApi";
pub const RESET: &str = "reset";
pub const TIME_ZONE_OFFSET: &str = "timeZoneOffset";

pub const GET_VALUE: &str = "getValue";
pub const SET_VALUE: &str = "setValue";
pub const GET_DEFAULT_VALUE: &str = "getDefaultValue";

// ─── Parameters ─────────────────────────────────────────────────────

/// Value shape accepted by a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    /// Integer within `[min, max]`.
    Long { min: i64, max: i64 },
    /// Array of integers within `[min, max]`, length within `[len_min, len_max]`.
    LongArray {
        min: i64,
        max: i64,
        len_min: usize,
        len_max: usize,
    },
    /// Any JSON value; arrays must have a length within `[len_min, len_max]`.
    Any { len_min: usize, len_max: usize },
}

/// A declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub kind: ParameterKind,
    pub units: Option<&'static str>,
}

pub const ADDRESS: ParameterSpec = ParameterSpec {
    name: "address",
    kind: ParameterKind::LongArray {
        min: ADDRESS_MIN,
        max: ADDRESS_MAX,
        len_min: ADDRESS_ARRAY_LENGTH_MIN,
        len_max: ADDRESS_ARRAY_LENGTH_MAX,
    },
    units: None,
};

pub const REQUEST: ParameterSpec = ParameterSpec {
    name: "request",
    kind: ParameterKind::Any {
        len_min: REQUEST_ARRAY_LENGTH_MIN,
        len_max: REQUEST_ARRAY_LENGTH_MAX,
    },
    units: None,
};

pub const EPOCH_TIME: ParameterSpec = ParameterSpec {
    name: "epoch_time",
    kind: ParameterKind::Long {
        min: EPOCH_TIME_MIN,
        max: EPOCH_TIME_MAX,
    },
    units: Some("s"),
};

pub const ADJUST_TIME_DELTA: ParameterSpec = ParameterSpec {
    name: "adjust_time",
    kind: ParameterKind::Long {
        min: i64::MIN,
        max: i64::MAX,
    },
    units: Some("s"),
};

fn long_in_range(name: &str, value: &Value, min: i64, max: i64) -> Result<i64, ServerError> {
    let n = value
        .as_i64()
        .ok_or_else(|| ServerError::InvalidParams(format!("{name}: expected an integer")))?;
    if !(min..=max).contains(&n) {
        return Err(ServerError::InvalidParams(format!(
            "{name}: {n} outside [{min}, {max}]"
        )));
    }
    Ok(n)
}

fn length_in_range(name: &str, len: usize, min: usize, max: usize) -> Result<(), ServerError> {
    if !(min..=max).contains(&len) {
        return Err(ServerError::InvalidParams(format!(
            "{name}: array length {len} outside [{min}, {max}]"
        )));
    }
    Ok(())
}

impl ParameterSpec {
    /// Check `value` against the declared type and range.
    ///
    /// # Errors
    /// Returns `ServerError::InvalidParams` naming the parameter.
    pub fn validate(&self, value: &Value) -> Result<(), ServerError> {
        match self.kind {
            ParameterKind::Long { min, max } => long_in_range(self.name, value, min, max).map(drop),
            ParameterKind::LongArray {
                min,
                max,
                len_min,
                len_max,
            } => {
                let items = value.as_array().ok_or_else(|| {
                    ServerError::InvalidParams(format!("{}: expected an array", self.name))
                })?;
                length_in_range(self.name, items.len(), len_min, len_max)?;
                items
                    .iter()
                    .try_for_each(|item| long_in_range(self.name, item, min, max).map(drop))
            }
            ParameterKind::Any { len_min, len_max } => match value {
                Value::Array(items) => length_in_range(self.name, items.len(), len_min, len_max),
                _ => Ok(()),
            },
        }
    }

    fn describe(&self) -> Value {
        let mut doc = match self.kind {
            ParameterKind::Long { min, max } => {
                let mut doc = json!({ "name": self.name, "type": "long" });
                if min != i64::MIN {
                    doc["min"] = json!(min);
                }
                if max != i64::MAX {
                    doc["max"] = json!(max);
                }
                doc
            }
            ParameterKind::LongArray {
                min,
                max,
                len_min,
                len_max,
            } => json!({
                "name": self.name,
                "type": "array",
                "array_element_type": "long",
                "min": min,
                "max": max,
                "array_length_min": len_min,
                "array_length_max": len_max,
            }),
            ParameterKind::Any { len_min, len_max } => json!({
                "name": self.name,
                "type": "any",
                "array_length_min": len_min,
                "array_length_max": len_max,
            }),
        };
        if let Some(units) = self.units {
            doc["units"] = json!(units);
        }
        doc
    }
}

// ─── Functions ──────────────────────────────────────────────────────

/// Handler tag of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    ForwardToAddress,
    GetClientInfo,
    SetTime,
    GetTime,
    AdjustTime,
    Now,
    GetDeviceId,
    GetDeviceInfo,
    GetApi,
}

/// Declared result type of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultType {
    Void,
    Long,
    Object,
    Array,
    Any,
}

impl ResultType {
    fn as_str(self) -> Option<&'static str> {
        match self {
            Self::Void => None,
            Self::Long => Some("long"),
            Self::Object => Some("object"),
            Self::Array => Some("array"),
            Self::Any => Some("any"),
        }
    }
}

/// A declared function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub function: Function,
    pub parameters: &'static [ParameterSpec],
    pub result: ResultType,
}

impl FunctionSpec {
    /// Check parameter count and every parameter value.
    ///
    /// # Errors
    /// Returns `ServerError::InvalidParams` on the first mismatch.
    pub fn validate_params(&self, params: &[Value]) -> Result<(), ServerError> {
        if params.len() != self.parameters.len() {
            return Err(ServerError::InvalidParams(format!(
                "{} takes {} parameter(s), got {}",
                self.name,
                self.parameters.len(),
                params.len()
            )));
        }
        self.parameters
            .iter()
            .zip(params)
            .try_for_each(|(spec, value)| spec.validate(value))
    }
}

pub const FUNCTIONS: &[FunctionSpec] = &[
    FunctionSpec {
        name: FORWARD_TO_ADDRESS,
        function: Function::ForwardToAddress,
        parameters: &[ADDRESS, REQUEST],
        result: ResultType::Any,
    },
    FunctionSpec {
        name: GET_CLIENT_INFO,
        function: Function::GetClientInfo,
        parameters: &[],
        result: ResultType::Array,
    },
    FunctionSpec {
        name: SET_TIME,
        function: Function::SetTime,
        parameters: &[EPOCH_TIME],
        result: ResultType::Void,
    },
    FunctionSpec {
        name: GET_TIME,
        function: Function::GetTime,
        parameters: &[],
        result: ResultType::Long,
    },
    FunctionSpec {
        name: ADJUST_TIME,
        function: Function::AdjustTime,
        parameters: &[ADJUST_TIME_DELTA],
        result: ResultType::Void,
    },
    FunctionSpec {
        name: NOW,
        function: Function::Now,
        parameters: &[],
        result: ResultType::Object,
    },
    FunctionSpec {
        name: GET_DEVICE_ID,
        function: Function::GetDeviceId,
        parameters: &[],
        result: ResultType::Object,
    },
    FunctionSpec {
        name: GET_DEVICE_INFO,
        function: Function::GetDeviceInfo,
        parameters: &[],
        result: ResultType::Object,
    },
    FunctionSpec {
        name: GET_API,
        function: Function::GetApi,
        parameters: &[],
        result: ResultType::Object,
    },
];

// ─── Callbacks ──────────────────────────────────────────────────────

/// Handler tag of a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callback {
    Reset,
}

/// A declared callback: no parameters, no result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackSpec {
    pub name: &'static str,
    pub callback: Callback,
}

pub const CALLBACKS: &[CallbackSpec] = &[CallbackSpec {
    name: RESET,
    callback: Callback::Reset,
}];

// ─── Properties ─────────────────────────────────────────────────────

/// Handler tag of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    TimeZoneOffset,
}

/// A declared integer property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertySpec {
    pub name: &'static str,
    pub property: Property,
    pub min: i64,
    pub max: i64,
    pub units: Option<&'static str>,
}

/// Operation requested on a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyOp {
    GetValue,
    SetValue(i64),
    GetDefaultValue,
}

impl PropertySpec {
    /// Decode the property sub-command from the request parameters.
    ///
    /// `[]` and `["getValue"]` read, `["setValue", v]` writes (range
    /// checked), `["getDefaultValue"]` reads the default.
    ///
    /// # Errors
    /// Returns `ServerError::InvalidParams` for anything else.
    pub fn parse_op(&self, params: &[Value]) -> Result<PropertyOp, ServerError> {
        match params {
            [] => Ok(PropertyOp::GetValue),
            [op] if op == GET_VALUE => Ok(PropertyOp::GetValue),
            [op] if op == GET_DEFAULT_VALUE => Ok(PropertyOp::GetDefaultValue),
            [op, value] if op == SET_VALUE => {
                long_in_range(self.name, value, self.min, self.max).map(PropertyOp::SetValue)
            }
            _ => Err(ServerError::InvalidParams(format!(
                "{}: expected {GET_VALUE}, {SET_VALUE} <value> or {GET_DEFAULT_VALUE}",
                self.name
            ))),
        }
    }
}

pub const PROPERTIES: &[PropertySpec] = &[PropertySpec {
    name: TIME_ZONE_OFFSET,
    property: Property::TimeZoneOffset,
    min: TIME_ZONE_OFFSET_MIN,
    max: TIME_ZONE_OFFSET_MAX,
    units: Some("h"),
}];

// ─── Lookup ─────────────────────────────────────────────────────────

/// What a method name resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Function(&'static FunctionSpec),
    Callback(&'static CallbackSpec),
    Property(&'static PropertySpec),
}

/// Resolve a method name against the declared tables.
pub fn resolve(method: &str) -> Option<Target> {
    FUNCTIONS
        .iter()
        .find(|f| f.name == method)
        .map(Target::Function)
        .or_else(|| {
            CALLBACKS
                .iter()
                .find(|c| c.name == method)
                .map(Target::Callback)
        })
        .or_else(|| {
            PROPERTIES
                .iter()
                .find(|p| p.name == method)
                .map(Target::Property)
        })
}

/// API description returned by `getApi`.
pub fn describe() -> Value {
    let functions: Vec<Value> = FUNCTIONS
        .iter()
        .map(|f| {
            let mut doc = json!({
                "name": f.name,
                "parameters": f.parameters.iter().map(|p| p.name).collect::<Vec<_>>(),
            });
            if let Some(result) = f.result.as_str() {
                doc["result_info"] = json!({ "type": result });
            }
            doc
        })
        .collect();
    let parameters: Vec<Value> = [ADDRESS, REQUEST, EPOCH_TIME, ADJUST_TIME_DELTA]
        .iter()
        .map(ParameterSpec::describe)
        .collect();
    let properties: Vec<Value> = PROPERTIES
        .iter()
        .map(|p| {
            let mut doc = json!({ "name": p.name, "type": "long", "min": p.min, "max": p.max });
            if let Some(units) = p.units {
                doc["units"] = json!(units);
            }
            doc
        })
        .collect();
    json!({
        "functions": functions,
        "parameters": parameters,
        "properties": properties,
        "callbacks": CALLBACKS.iter().map(|c| c.name).collect::<Vec<_>>(),
    })
}
