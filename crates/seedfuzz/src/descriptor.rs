use crate::SeedfuzzError;
use serde::Deserialize;
use std::path::PathBuf;

/// Call form of the method under test, resolved once at analysis time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dispatch {
    Static,
    Instance,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: String,
}

/// Immutable description of the method under test, produced once per
/// signature by the external analysis service and never mutated afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct MethodDescriptor {
    pub signature: String,
    /// Fully qualified path of the declaring type, e.g. `mylib::json::Parser`.
    pub type_path: String,
    pub method: String,
    pub dispatch: Dispatch,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default = "default_return")]
    pub returns: String,
}

fn default_return() -> String {
    "()".to_string()
}

impl MethodDescriptor {
    pub fn is_static(&self) -> bool {
        self.dispatch == Dispatch::Static
    }

    /// Last segment of the declaring type path.
    pub fn type_name(&self) -> &str {
        self.type_path.rsplit("::").next().unwrap_or(&self.type_path)
    }

    /// Receiver binding the construction snippet is expected to introduce
    /// for instance dispatch: the snake_case form of the type name.
    pub fn receiver_binding(&self) -> String {
        let mut out = String::new();
        for (i, ch) in self.type_name().chars().enumerate() {
            if ch.is_ascii_uppercase() {
                if i > 0 {
                    out.push('_');
                }
                out.push(ch.to_ascii_lowercase());
            } else {
                out.push(ch);
            }
        }
        out
    }

    /// Qualified path of the function under test, as trace events report it.
    pub fn target_function(&self) -> String {
        format!("{}::{}", self.type_path, self.method)
    }

    /// Call expression over the declared parameter names, dispatched per
    /// the resolved call form.
    pub fn call_expression(&self) -> String {
        let args = self
            .params
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        match self.dispatch {
            Dispatch::Static => format!("{}::{}({})", self.type_name(), self.method, args),
            Dispatch::Instance => {
                format!("{}.{}({})", self.receiver_binding(), self.method, args)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct SignatureParseError(pub String);

/// Splits a textual signature `path::to::Type::method(T1, T2)` into its
/// declaring-type path and method name. Used to reject malformed signatures
/// before handing them to the analysis collaborator.
pub fn split_signature(signature: &str) -> Result<(String, String), SignatureParseError> {
    let open = signature
        .find('(')
        .ok_or_else(|| SignatureParseError(format!("missing parameter list in {signature}")))?;
    if !signature.ends_with(')') {
        return Err(SignatureParseError(format!(
            "missing closing parenthesis in {signature}"
        )));
    }
    let qualified = &signature[..open];
    let sep = qualified.rfind("::").ok_or_else(|| {
        SignatureParseError(format!("expected a qualified method path in {signature}"))
    })?;
    let type_path = &qualified[..sep];
    let method = &qualified[sep + 2..];
    if type_path.is_empty() || method.is_empty() {
        return Err(SignatureParseError(format!(
            "expected <type path>::<method> in {signature}"
        )));
    }
    Ok((type_path.to_string(), method.to_string()))
}

pub trait SignatureAnalysis {
    fn resolve(&self, signature: &str) -> Result<MethodDescriptor, SeedfuzzError>;
}

/// Analysis handover via a JSON descriptor file written by the external
/// type/hierarchy analysis service.
pub struct JsonAnalysis {
    pub path: PathBuf,
}

impl SignatureAnalysis for JsonAnalysis {
    fn resolve(&self, signature: &str) -> Result<MethodDescriptor, SeedfuzzError> {
        let text = std::fs::read_to_string(&self.path).map_err(|err| {
            SeedfuzzError::Analysis(format!("cannot read {}: {err}", self.path.display()))
        })?;
        let descriptor: MethodDescriptor = serde_json::from_str(&text).map_err(|err| {
            SeedfuzzError::Analysis(format!("cannot parse {}: {err}", self.path.display()))
        })?;
        if descriptor.signature != signature {
            return Err(SeedfuzzError::Analysis(format!(
                "descriptor is for {}, not {signature}",
                descriptor.signature
            )));
        }
        Ok(descriptor)
    }
}
