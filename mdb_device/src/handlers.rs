//! Request handlers.
//!
//! Resolves a request against the declared API and runs the matching
//! handler on the device. Every request gets exactly one response.

use mdb_common::clock::Clock;
use mdb_common::types::Address;
use mdb_common::watchdog::HardwareWatchdog;
use serde_json::{Value, json};
use tracing::debug;

use crate::device::ModularDevice;
use crate::server::api::{self, Callback, Function, Property, PropertyOp, PropertySpec, Target};
use crate::server::{Request, ServerError, error_response, result_response};

fn long_param(params: &[Value], index: usize) -> Result<i64, ServerError> {
    params
        .get(index)
        .and_then(Value::as_i64)
        .ok_or_else(|| ServerError::InvalidParams(format!("parameter {index}: expected an integer")))
}

fn address_param(params: &[Value], index: usize) -> Result<Vec<Address>, ServerError> {
    let invalid = || ServerError::InvalidParams(format!("parameter {index}: expected an address array"));
    params
        .get(index)
        .and_then(Value::as_array)
        .ok_or_else(invalid)?
        .iter()
        .map(|hop| {
            hop.as_u64()
                .and_then(|n| Address::try_from(n).ok())
                .ok_or_else(invalid)
        })
        .collect()
}

impl<W: HardwareWatchdog, K: Clock, const N: usize> ModularDevice<W, K, N> {
    /// Answer one request document.
    pub fn handle_request(&mut self, message: Value) -> Value {
        let id = Request::id_of(&message);
        let request = match Request::parse(message) {
            Ok(request) => request,
            Err(e) => {
                debug!("Rejected message: {}", e);
                return error_response(&id, &e);
            }
        };

        match self.dispatch(&request) {
            Ok(result) => result_response(&request.id, result),
            Err(e) => {
                debug!("Request '{}' failed: {}", request.method, e);
                error_response(&request.id, &e)
            }
        }
    }

    fn dispatch(&mut self, request: &Request) -> Result<Value, ServerError> {
        match api::resolve(&request.method) {
            Some(Target::Function(spec)) => {
                spec.validate_params(&request.params)?;
                self.call_function(spec.function, &request.params)
            }
            Some(Target::Callback(spec)) => {
                if !request.params.is_empty() {
                    return Err(ServerError::InvalidParams(format!(
                        "{} takes no parameters",
                        spec.name
                    )));
                }
                self.call_callback(spec.callback);
                Ok(Value::Null)
            }
            Some(Target::Property(spec)) => self.property_request(spec, &request.params),
            None => Err(ServerError::MethodNotFound(request.method.clone())),
        }
    }

    fn call_function(&mut self, function: Function, params: &[Value]) -> Result<Value, ServerError> {
        match function {
            Function::ForwardToAddress => {
                let path = address_param(params, 0)?;
                let request = params
                    .get(1)
                    .ok_or_else(|| ServerError::InvalidParams("missing request".into()))?;
                Ok(self.forward(&path, request)?)
            }
            Function::GetClientInfo => Ok(self.clients.info(&self.registry)),
            Function::SetTime => {
                let epoch = long_param(params, 0)?;
                let now = self.clock.now_ms();
                self.time.set_time(epoch, now);
                Ok(Value::Null)
            }
            Function::GetTime => Ok(json!(self.time.get_time(self.clock.now_ms())?)),
            Function::AdjustTime => {
                self.time.adjust_time(long_param(params, 0)?);
                Ok(Value::Null)
            }
            Function::Now => {
                let epoch = self.time.now(self.clock.now_ms())?;
                let local = self.time.local_date_time(epoch)?;
                serde_json::to_value(local).map_err(|e| ServerError::Internal(e.to_string()))
            }
            Function::GetDeviceId => Ok(json!({
                "name": self.identity.name,
                "form_factor": self.identity.form_factor,
            })),
            Function::GetDeviceInfo => serde_json::to_value(&self.identity)
                .map_err(|e| ServerError::Internal(e.to_string())),
            Function::GetApi => Ok(api::describe()),
        }
    }

    fn call_callback(&mut self, callback: Callback) {
        match callback {
            Callback::Reset => self.watchdog.request_system_reset(),
        }
    }

    fn property_request(
        &mut self,
        spec: &PropertySpec,
        params: &[Value],
    ) -> Result<Value, ServerError> {
        let op = spec.parse_op(params)?;
        match (spec.property, op) {
            (Property::TimeZoneOffset, PropertyOp::GetValue) => {
                Ok(json!(self.time.time_zone_offset()))
            }
            (Property::TimeZoneOffset, PropertyOp::SetValue(hours)) => {
                self.time.set_time_zone_offset(hours);
                Ok(json!(hours))
            }
            (Property::TimeZoneOffset, PropertyOp::GetDefaultValue) => {
                Ok(json!(self.time_zone_offset_default))
            }
        }
    }
}
