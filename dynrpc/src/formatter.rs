use colored::*;
use dynrpc_core::{
    client::ClientError,
    prost_reflect::{EnumDescriptor, Kind, MessageDescriptor, MethodDescriptor, ServiceDescriptor},
    schema::{SchemaError, SchemaNode},
    tonic::Status,
};

/// A wrapper struct for a formatted, colored string.
///
/// Implements `Display` so it can be printed directly.
pub struct FormattedString(pub String);

/// A titled list of symbols, e.g. the services of a server.
pub struct SymbolList(pub &'static str, pub Vec<String>);

impl std::fmt::Display for FormattedString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        writeln!(f, "{}", self.0)?;
        Ok(())
    }
}

impl From<&Status> for FormattedString {
    fn from(status: &Status) -> Self {
        FormattedString(format!(
            "{} code={:?} message={:?}",
            "gRPC Failed:".red().bold(),
            status.code(),
            status.message()
        ))
    }
}

impl From<anyhow::Error> for FormattedString {
    fn from(err: anyhow::Error) -> Self {
        let status = err
            .downcast_ref::<ClientError>()
            .and_then(|err| match err {
                ClientError::Call(call) => call.status(),
                _ => None,
            });
        if let Some(status) = status {
            return FormattedString::from(status);
        }

        let mut out = format!("{}\n\n'{:#}'", "Error:".red().bold(), err);
        if reflection_unsupported(&err) {
            out.push_str(&format!(
                "\n\n{} the server does not expose the reflection service, pass proto files with --proto instead",
                "hint:".yellow().bold()
            ));
        }
        FormattedString(out)
    }
}

fn reflection_unsupported(err: &anyhow::Error) -> bool {
    let schema_error = err.downcast_ref::<SchemaError>().or_else(|| {
        match err.downcast_ref::<ClientError>() {
            Some(ClientError::Schema(err)) => Some(err),
            _ => None,
        }
    });
    matches!(schema_error, Some(SchemaError::ReflectionNotSupported(_)))
}

impl From<SymbolList> for FormattedString {
    fn from(SymbolList(title, symbols): SymbolList) -> Self {
        if symbols.is_empty() {
            return FormattedString(format!("No {title} found.").yellow().to_string());
        }

        let mut out = String::new();
        out.push_str(&format!("Available {title}:\n"));
        for symbol in symbols {
            out.push_str(&format!("  - {}\n", symbol.green()));
        }
        FormattedString(out.trim_end().to_string())
    }
}

impl From<SchemaNode> for FormattedString {
    fn from(node: SchemaNode) -> Self {
        match node {
            SchemaNode::Service(service) => FormattedString::from(service),
            SchemaNode::Method(method) => FormattedString::from(method),
            SchemaNode::Message(message) => FormattedString::from(message),
            SchemaNode::Enum(enum_desc) => FormattedString::from(enum_desc),
        }
    }
}

impl From<ServiceDescriptor> for FormattedString {
    fn from(service: ServiceDescriptor) -> Self {
        let mut out = String::new();
        out.push_str(&format!(
            "{} {} {{\n",
            "service".cyan(),
            service.name().green()
        ));

        for method in service.methods() {
            out.push_str("  ");
            out.push_str(&FormattedString::from(method).0);
            out.push('\n');
        }
        out.push('}');
        FormattedString(out)
    }
}

impl From<MethodDescriptor> for FormattedString {
    fn from(method: MethodDescriptor) -> Self {
        let stream = |streaming: bool| {
            if streaming {
                format!("{} ", "stream".cyan())
            } else {
                String::new()
            }
        };

        FormattedString(format!(
            "{} {}({}{}) {} ({}{});",
            "rpc".cyan(),
            method.name().green(),
            stream(method.is_client_streaming()),
            method.input().full_name().yellow(),
            "returns".cyan(),
            stream(method.is_server_streaming()),
            method.output().full_name().yellow()
        ))
    }
}

fn kind_name(kind: &Kind) -> String {
    match kind {
        Kind::Double => "double".into(),
        Kind::Float => "float".into(),
        Kind::Int32 => "int32".into(),
        Kind::Int64 => "int64".into(),
        Kind::Uint32 => "uint32".into(),
        Kind::Uint64 => "uint64".into(),
        Kind::Sint32 => "sint32".into(),
        Kind::Sint64 => "sint64".into(),
        Kind::Fixed32 => "fixed32".into(),
        Kind::Fixed64 => "fixed64".into(),
        Kind::Sfixed32 => "sfixed32".into(),
        Kind::Sfixed64 => "sfixed64".into(),
        Kind::Bool => "bool".into(),
        Kind::String => "string".into(),
        Kind::Bytes => "bytes".into(),
        Kind::Message(m) => m.full_name().into(),
        Kind::Enum(e) => e.full_name().into(),
    }
}

impl From<MessageDescriptor> for FormattedString {
    fn from(message: MessageDescriptor) -> Self {
        let mut out = String::new();
        out.push_str(&format!(
            "{} {} {{\n",
            "message".cyan(),
            message.name().green()
        ));

        for field in message.fields() {
            let type_name = match field.kind() {
                Kind::Message(entry) if field.is_map() => {
                    let key = kind_name(&entry.map_entry_key_field().kind());
                    let value = kind_name(&entry.map_entry_value_field().kind());
                    format!("map<{key}, {value}>")
                }
                kind => kind_name(&kind),
            };
            let label = if field.is_list() {
                format!("{} ", "repeated".cyan())
            } else {
                String::new()
            };

            out.push_str(&format!(
                "  {}{} {} = {};\n",
                label,
                type_name.yellow(),
                field.name(),
                field.number()
            ));
        }
        out.push('}');
        FormattedString(out)
    }
}

impl From<EnumDescriptor> for FormattedString {
    fn from(enum_desc: EnumDescriptor) -> Self {
        let mut out = String::new();
        out.push_str(&format!(
            "{} {} {{\n",
            "enum".cyan(),
            enum_desc.name().green()
        ));

        for val in enum_desc.values() {
            out.push_str(&format!(
                "  {} = {};\n",
                val.name(),
                val.number().to_string().purple()
            ));
        }
        out.push('}');

        FormattedString(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use dynrpc_core::reflection::client::ReflectionResolveError;

    #[test]
    fn test_reflection_hint() {
        let err = SchemaError::ReflectionNotSupported(ReflectionResolveError::ServerStreamInitFailed(
            Status::unimplemented("no reflection"),
        ));

        let out = FormattedString::from(anyhow::Error::from(ClientError::Schema(err)));
        assert!(out.0.contains("hint:"));

        let out = FormattedString::from(anyhow::anyhow!("boom"));
        assert!(!out.0.contains("hint:"));
    }

    #[test]
    fn test_symbol_list() {
        colored::control::set_override(false);

        let out = FormattedString::from(SymbolList("services", vec!["echo.EchoService".into()]));
        assert_eq!(out.0, "Available services:\n  - echo.EchoService");

        let out = FormattedString::from(SymbolList("methods", vec![]));
        assert_eq!(out.0, "No methods found.");
    }
}
