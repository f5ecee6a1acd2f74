use crate::transport::MethodType;

use super::{MethodDescription, ServiceDescription};

const RUST_KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "gen", "if", "impl", "in", "let", "loop", "match", "mod",
    "move", "mut", "pub", "ref", "return", "self", "static", "struct", "super", "trait", "true",
    "type", "unsafe", "use", "where", "while", "yield",
];

/// Render Rust source for a validated service description.
///
/// The output expects the request and response types to be in scope where
/// it is included, and refers to this crate as `::nagare`.
pub fn generate(service: &ServiceDescription) -> String {
    let mut out = SourceWriter::default();
    let snake = snake_case(&service.name);
    let methods_mod = format!("{snake}_methods");

    out.line(format!(
        "// Generated by nagare from service `{}`. Do not edit.",
        service.full_name()
    ));
    out.blank();

    emit_descriptors(&mut out, service, &methods_mod);
    out.blank();
    emit_client(&mut out, service, &methods_mod);
    out.blank();
    emit_server_trait(&mut out, service);
    out.blank();
    emit_service_definition(&mut out, service, &snake, &methods_mod);

    out.finish()
}

fn emit_descriptors(out: &mut SourceWriter, service: &ServiceDescription, methods_mod: &str) {
    out.line(format!("/// Method descriptors of `{}`.", service.full_name()));
    out.open(format!("pub mod {methods_mod} {{"));
    out.line("use super::*;");
    for method in &service.methods {
        out.blank();
        out.open(format!(
            "pub fn {}() -> ::nagare::MethodDescriptor<{}, {}> {{",
            fn_name(method),
            method.request,
            method.response
        ));
        out.line(format!(
            "::nagare::MethodDescriptor::new(\"{}/{}\", ::nagare::MethodType::{:?})",
            service.full_name(),
            method.name,
            method.method_type()
        ));
        out.close("}");
    }
    out.close("}");
}

fn emit_client(out: &mut SourceWriter, service: &ServiceDescription, methods_mod: &str) {
    let client = format!("{}Client", service.name);
    out.line(format!("/// Client stub for `{}`.", service.full_name()));
    out.line("#[derive(Clone)]");
    out.open(format!("pub struct {client}<C> {{"));
    out.line("channel: C,");
    out.line("options: ::nagare::CallOptions,");
    out.close("}");
    out.blank();
    out.open(format!("impl<C: ::nagare::Channel> {client}<C> {{"));
    out.open("pub fn new(channel: C) -> Self {");
    out.open("Self {");
    out.line("channel,");
    out.line("options: ::nagare::CallOptions::default(),");
    out.close("}");
    out.close("}");
    out.blank();
    out.line("/// Options applied to every call made through this stub.");
    out.open("pub fn with_options(mut self, options: ::nagare::CallOptions) -> Self {");
    out.line("self.options = options;");
    out.line("self");
    out.close("}");

    for method in &service.methods {
        out.blank();
        let name = fn_name(method);
        let descriptor = format!("&{methods_mod}::{name}()");
        let (req, resp) = (&method.request, &method.response);
        match method.method_type() {
            MethodType::Unary => {
                out.open(format!(
                    "pub async fn {name}(&self, request: {req}) -> Result<{resp}, ::nagare::Status> {{"
                ));
                out.line(format!(
                    "::nagare::unary_call(&self.channel, {descriptor}, request, self.options.clone()).await"
                ));
            }
            MethodType::ClientStreaming => {
                out.line(format!(
                    "pub async fn {name}<S>(&self, requests: S) -> Result<{resp}, ::nagare::Status>"
                ));
                out.line("where");
                out.line(format!("    S: ::nagare::Stream<Item = {req}> + Send + 'static,"));
                out.open("{");
                out.line(format!(
                    "::nagare::client_streaming_call(&self.channel, {descriptor}, requests, self.options.clone()).await"
                ));
            }
            MethodType::ServerStreaming => {
                out.open(format!(
                    "pub fn {name}(&self, request: {req}) -> Result<::nagare::Streaming<{resp}>, ::nagare::Status> {{"
                ));
                out.line(format!(
                    "::nagare::server_streaming_call(&self.channel, {descriptor}, request, self.options.clone())"
                ));
            }
            MethodType::BidiStreaming => {
                out.line(format!(
                    "pub fn {name}<S>(&self, requests: S) -> Result<::nagare::Streaming<{resp}>, ::nagare::Status>"
                ));
                out.line("where");
                out.line(format!("    S: ::nagare::Stream<Item = {req}> + Send + 'static,"));
                out.open("{");
                out.line(format!(
                    "::nagare::bidi_streaming_call(&self.channel, {descriptor}, requests, self.options.clone())"
                ));
            }
        }
        out.close("}");
    }
    out.close("}");
}

fn emit_server_trait(out: &mut SourceWriter, service: &ServiceDescription) {
    out.line(format!("/// Server implementation of `{}`.", service.full_name()));
    out.open(format!("pub trait {}: Send + Sync + 'static {{", service.name));
    for (i, method) in service.methods.iter().enumerate() {
        if i > 0 {
            out.blank();
        }
        let name = fn_name(method);
        let (req, resp) = (&method.request, &method.response);
        let (params, output) = match method.method_type() {
            MethodType::Unary => (format!("request: {req}"), resp.to_string()),
            MethodType::ClientStreaming => (
                format!("requests: ::nagare::Streaming<{req}>"),
                resp.to_string(),
            ),
            MethodType::ServerStreaming => (
                format!("request: {req}, responses: ::nagare::ResponseSink<{resp}>"),
                "()".to_string(),
            ),
            MethodType::BidiStreaming => (
                format!(
                    "requests: ::nagare::Streaming<{req}>, responses: ::nagare::ResponseSink<{resp}>"
                ),
                "()".to_string(),
            ),
        };
        out.line(format!(
            "fn {name}(&self, context: ::nagare::CallContext, {params}) -> impl ::std::future::Future<Output = ::nagare::HandlerResult<{output}>> + Send;"
        ));
    }
    out.close("}");
}

fn emit_service_definition(
    out: &mut SourceWriter,
    service: &ServiceDescription,
    snake: &str,
    methods_mod: &str,
) {
    out.line(format!(
        "/// Bind every method of `{}` to `service`.",
        service.full_name()
    ));
    out.open(format!(
        "pub fn {snake}_service_definition<T: {}>(",
        service.name
    ));
    out.line("context: &::nagare::ExecutionContext,");
    out.line("service: ::std::sync::Arc<T>,");
    out.dedent();
    out.open(") -> Result<::nagare::ServiceDefinition, ::nagare::Status> {");
    out.line(format!(
        "let definition = ::nagare::ServiceDefinition::new(\"{}\");",
        service.full_name()
    ));
    for method in &service.methods {
        let name = fn_name(method);
        let (helper, params) = match method.method_type() {
            MethodType::Unary => ("unary_method_definition", "context, request"),
            MethodType::ClientStreaming => {
                ("client_streaming_method_definition", "context, requests")
            }
            MethodType::ServerStreaming => (
                "server_streaming_method_definition",
                "context, request, responses",
            ),
            MethodType::BidiStreaming => (
                "bidi_streaming_method_definition",
                "context, requests, responses",
            ),
        };
        out.open("let definition = {");
        out.line("let service = ::std::sync::Arc::clone(&service);");
        out.open(format!(
            "definition.with_method(::nagare::{helper}(context, &{methods_mod}::{name}(), move |{params}| {{"
        ));
        out.line("let service = ::std::sync::Arc::clone(&service);");
        out.line(format!("async move {{ service.{name}({params}).await }}"));
        out.close("})?)?");
        out.close("};");
    }
    out.line("Ok(definition)");
    out.close("}");
}

fn fn_name(method: &MethodDescription) -> String {
    escape_keyword(snake_case(&method.name))
}

fn escape_keyword(ident: String) -> String {
    if RUST_KEYWORDS.contains(&ident.as_str()) {
        format!("r#{ident}")
    } else {
        ident
    }
}

/// `SayHello` -> `say_hello`, `HTTPGet` -> `http_get`.
pub(crate) fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_ascii_uppercase() => next.is_some_and(|n| n.is_ascii_lowercase()),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Line-oriented writer with four-space indentation.
#[derive(Default)]
struct SourceWriter {
    out: String,
    depth: usize,
}

impl SourceWriter {
    fn line(&mut self, text: impl AsRef<str>) {
        for _ in 0..self.depth {
            self.out.push_str("    ");
        }
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }

    /// Write `text` and indent what follows.
    fn open(&mut self, text: impl AsRef<str>) {
        self.line(text);
        self.depth += 1;
    }

    /// Dedent and write `text`.
    fn close(&mut self, text: impl AsRef<str>) {
        self.dedent();
        self.line(text);
    }

    fn dedent(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn finish(self) -> String {
        self.out
    }
}
