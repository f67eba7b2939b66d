//! Assembly of the self-contained program a new context loads.
//!
//! The program is imports, then serialized methods, then a line installing
//! the message handler. It is handed to the platform as a `data:` URL so no
//! file is ever written.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::error::Result;
use crate::method::Methods;
use crate::scope::ScriptScope;

use super::WorkerType;
use super::imports::{Imports, emit_imports};
use super::serializer::serialize_methods;

/// MIME type of generated programs.
pub const SCRIPT_MIME: &str = "application/javascript";

/// Executor half of the router, as script text. `__POST__` names the object
/// replies are posted through.
const EXECUTOR_TEMPLATE: &str = r#"(event) => {
    const { action, payload } = event.data || {};
    if (action !== "global" || !payload || !payload.id
        || "result" in payload || "error" in payload
        || (!payload.method && !Array.isArray(payload.args))) {
        return;
    }
    const { id, method, workerName, isModule } = payload;
    const args = payload.args || [];
    const reply = (body) => __POST__.postMessage({
        action: "global",
        payload: Object.assign({ id, method, workerName }, body),
    });
    const bindings = isModule
        ? (typeof workerMethods !== "undefined" ? workerMethods : {})
        : self;
    const func = method ? bindings[method] : undefined;
    if (typeof func !== "function") {
        reply({ error: "NO_SUCH_METHOD" });
        return;
    }
    Promise.resolve()
        .then(() => func(...args))
        .then(
            (result) => reply({ result }),
            (err) => reply({ error: "" + err }),
        );
}"#;

/// How the generated handler receives messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entrypoint {
    /// Dedicated context: messages arrive on the global scope.
    Direct,
    /// Shared context: each connection hands over a port to listen on.
    PortAccept,
}

impl Entrypoint {
    pub fn for_shared(is_shared: bool) -> Self {
        if is_shared { Self::PortAccept } else { Self::Direct }
    }

    /// Global hook the handler is assigned to.
    pub fn hook(self) -> &'static str {
        match self {
            Self::Direct => "onmessage",
            Self::PortAccept => "onconnect",
        }
    }

    /// Script text of the handler.
    pub fn handler_source(self) -> String {
        match self {
            Self::Direct => EXECUTOR_TEMPLATE.replace("__POST__", "self"),
            Self::PortAccept => {
                let executor = EXECUTOR_TEMPLATE.replace("__POST__", "port");
                format!(
                    "(event) => {{\n    const port = event.ports[0];\n    port.addEventListener(\"message\", {executor});\n    port.start();\n}}"
                )
            }
        }
    }
}

/// An anonymous loadable resource holding program text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    url: String,
}

impl Resource {
    pub fn from_program(program: &str) -> Self {
        Self {
            url: format!("data:{SCRIPT_MIME};base64,{}", STANDARD.encode(program)),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn mime(&self) -> &'static str {
        SCRIPT_MIME
    }
}

/// A fully assembled bootstrap program.
#[derive(Debug, Clone)]
pub struct Bootstrap {
    program: String,
    resource: Resource,
    scope: ScriptScope,
    worker_type: WorkerType,
    entrypoint: Entrypoint,
}

impl Bootstrap {
    /// Assemble imports, methods and the handler line into one program.
    pub fn assemble(
        methods: &Methods,
        imports: Option<&Imports>,
        worker_type: WorkerType,
        entrypoint: Entrypoint,
    ) -> Result<Self> {
        let mut program = String::new();

        if let Some(imports) = imports {
            program.push_str(&emit_imports(imports, worker_type)?);
            program.push('\n');
        }

        program.push_str(&serialize_methods(methods, worker_type)?);
        program.push_str(&format!(
            " \n\n self.{} = {};\n",
            entrypoint.hook(),
            entrypoint.handler_source()
        ));

        let resource = Resource::from_program(&program);
        tracing::debug!(
            bytes = program.len(),
            entries = methods.len(),
            ?worker_type,
            ?entrypoint,
            "assembled bootstrap program"
        );

        Ok(Self {
            program,
            resource,
            scope: ScriptScope::from_methods(methods, worker_type),
            worker_type,
            entrypoint,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Bindings the program declares.
    pub fn scope(&self) -> &ScriptScope {
        &self.scope
    }

    pub fn worker_type(&self) -> WorkerType {
        self.worker_type
    }

    pub fn entrypoint(&self) -> Entrypoint {
        self.entrypoint
    }

    pub fn into_scope(self) -> ScriptScope {
        self.scope
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::method::Callable;

    fn methods() -> Methods {
        Methods::new()
            .with_callable("add", Callable::new("add(a, b) { return a + b; }", |_| Ok(Value::Null)))
            .with_plain("limit", json!(2))
    }

    #[test]
    fn test_direct_program_layout() {
        let imports = Imports::list(["./lib.js"]);
        let boot = Bootstrap::assemble(
            &methods(),
            Some(&imports),
            WorkerType::Classic,
            Entrypoint::Direct,
        )
        .unwrap();

        let program = boot.program();
        assert!(program.starts_with(
            "importScripts(\"./lib.js\");\n\nfunction add(a, b) {\nreturn a + b;\n}\n\nlimit = 2; \n\n self.onmessage = (event) => {"
        ));
        assert!(program.contains("self.postMessage({"));
        assert!(program.contains("\"NO_SUCH_METHOD\""));
        assert!(!program.contains("__POST__"));
        assert!(program.ends_with("};\n"));
    }

    #[test]
    fn test_executor_classifies_calls_by_outcome() {
        let boot = Bootstrap::assemble(&methods(), None, WorkerType::Classic, Entrypoint::Direct)
            .unwrap();
        let program = boot.program();
        assert!(program.contains("\"result\" in payload || \"error\" in payload"));
        assert!(program.contains("const args = payload.args || [];"));
        assert!(!program.contains("!Array.isArray(payload.args)) {"));
    }

    #[test]
    fn test_shared_program_accepts_ports() {
        let boot =
            Bootstrap::assemble(&methods(), None, WorkerType::Module, Entrypoint::PortAccept)
                .unwrap();

        let program = boot.program();
        assert!(program.starts_with("const workerMethods = {\n"));
        assert!(program.contains("self.onconnect = (event) => {"));
        assert!(program.contains("const port = event.ports[0];"));
        assert!(program.contains("port.postMessage({"));
        assert!(program.contains("port.start();"));
        assert!(boot.scope().resolve("add", true).is_some());
    }

    #[test]
    fn test_resource_encodes_program() {
        let boot =
            Bootstrap::assemble(&methods(), None, WorkerType::Classic, Entrypoint::Direct).unwrap();
        let url = boot.resource().url();
        let encoded = url
            .strip_prefix("data:application/javascript;base64,")
            .unwrap();
        let decoded = STANDARD.decode(encoded).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), boot.program());
    }

    #[test]
    fn test_entrypoint_hooks() {
        assert_eq!(Entrypoint::for_shared(false).hook(), "onmessage");
        assert_eq!(Entrypoint::for_shared(true).hook(), "onconnect");
    }
}
