//! Template rendering.
//!
//! Expands `{{ }}` placeholders using the caller's [`Context`] and two
//! built-in functions:
//! - `env(name)` - value of a process environment variable (empty if unset)
//! - `cmd(command)` - trimmed stdout of a shell command, bounded by a timeout
//!
//! Undefined variables are errors. A failing placeholder fails the whole
//! render, so partially expanded text is never returned.

mod shell;
mod template;

use std::sync::Arc;
use std::time::Duration;

use async_recursion::async_recursion;
use mu_core::{CommandRunner, Context};
use tracing::debug;

use crate::error::{RenderError, RenderResult};
use template::{Expr, Segment};

pub use shell::ShellRunner;
pub use template::Template;

/// Default bound on each `cmd()` invocation.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of evaluating an expression.
enum Evaluated {
    Str(String),
    Number(String),
}

impl Evaluated {
    fn into_text(self) -> String {
        match self {
            Evaluated::Str(s) | Evaluated::Number(s) => s,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Evaluated::Str(_) => "string",
            Evaluated::Number(_) => "number",
        }
    }
}

/// Expands templates. Holds no per-call state, so one renderer can serve
/// many concurrent renders.
#[derive(Clone)]
pub struct Renderer {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("runner", &self.runner.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Renderer {
    /// A renderer using the platform shell and the default timeout.
    pub fn new() -> Self {
        Self::with_runner(Arc::new(ShellRunner::default()))
    }

    pub fn with_runner(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Parse and render template text.
    pub async fn render(&self, source: &str, context: &Context) -> RenderResult<String> {
        let template = Template::parse(source)?;
        self.render_template(&template, context).await
    }

    /// Render an already parsed template. Placeholders are evaluated one at a
    /// time, in textual order.
    pub async fn render_template(
        &self,
        template: &Template,
        context: &Context,
    ) -> RenderResult<String> {
        debug!(
            placeholders = template.placeholder_count(),
            context_vars = context.len(),
            "Rendering template"
        );

        let mut output = String::new();
        for segment in template.segments() {
            match segment {
                Segment::Text(text) => output.push_str(text),
                Segment::Placeholder { offset, expr } => {
                    let value = self.eval(expr, *offset, context).await?;
                    output.push_str(&value.into_text());
                }
            }
        }
        Ok(output)
    }

    #[async_recursion]
    async fn eval(&self, expr: &Expr, offset: usize, context: &Context) -> RenderResult<Evaluated> {
        match expr {
            Expr::Str(s) => Ok(Evaluated::Str(s.clone())),
            Expr::Number(n) => Ok(Evaluated::Number(n.clone())),
            Expr::Var(name) => context
                .get(name)
                .map(|v| Evaluated::Str(v.to_string()))
                .ok_or_else(|| RenderError::UndefinedReference {
                    name: name.clone(),
                    offset,
                }),
            Expr::Call { name, args } => match name.as_str() {
                "env" => {
                    let var = self.string_argument("env", args, offset, context).await?;
                    let value = std::env::var(&var).unwrap_or_default();
                    debug!(var = %var, set = !value.is_empty(), "Resolved env()");
                    Ok(Evaluated::Str(value))
                }
                "cmd" => {
                    let command = self.string_argument("cmd", args, offset, context).await?;
                    let output = self.runner.run(&command, self.timeout).await.map_err(|source| {
                        RenderError::BuiltinExecutionFailed {
                            function: "cmd".to_string(),
                            offset,
                            source,
                        }
                    })?;
                    Ok(Evaluated::Str(output.trimmed_stdout().to_string()))
                }
                other => Err(RenderError::UndefinedReference {
                    name: format!("{other}()"),
                    offset,
                }),
            },
        }
    }

    /// Evaluate the single string argument of a built-in.
    async fn string_argument(
        &self,
        function: &str,
        args: &[Expr],
        offset: usize,
        context: &Context,
    ) -> RenderResult<String> {
        let bad_argument = |message: String| RenderError::BadBuiltinArgument {
            function: function.to_string(),
            offset,
            message,
        };

        let [arg] = args else {
            return Err(bad_argument(format!(
                "expected exactly one argument, got {}",
                args.len()
            )));
        };

        match self.eval(arg, offset, context).await? {
            Evaluated::Str(s) => Ok(s),
            other => Err(bad_argument(format!(
                "expected a string, got a {}",
                other.kind()
            ))),
        }
    }
}

/// Render `source` with the platform shell and the given `cmd()` timeout.
pub async fn render(source: &str, context: &Context, timeout: Duration) -> RenderResult<String> {
    Renderer::new().with_timeout(timeout).render(source, context).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mu_core::{CommandOutput, ContextBuilder};
    use std::sync::Mutex;

    /// Records commands and replies from a fixed table.
    struct FakeRunner {
        calls: Mutex<Vec<String>>,
    }

    impl FakeRunner {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn run(&self, command: &str, timeout: Duration) -> mu_core::Result<CommandOutput> {
            self.calls.lock().unwrap().push(command.to_string());
            match command {
                "fail" => Err(mu_core::Error::ExitStatus {
                    command: command.to_string(),
                    code: Some(1),
                    stderr: String::new(),
                }),
                "hang" => Err(mu_core::Error::Timeout {
                    command: command.to_string(),
                    timeout,
                }),
                other => Ok(CommandOutput {
                    stdout: format!("out:{other}\n"),
                    stderr: String::new(),
                }),
            }
        }
    }

    fn ctx() -> Context {
        ContextBuilder::new()
            .with_build_time("20240101")
            .with_var("stage", "prod")
            .build()
    }

    #[tokio::test]
    async fn test_context_variables() {
        let out = Renderer::new()
            .render("name: app-{{ build_time }}-{{stage}}", &ctx())
            .await
            .unwrap();
        assert_eq!(out, "name: app-20240101-prod");
    }

    #[tokio::test]
    async fn test_deterministic_without_builtins() {
        let renderer = Renderer::new();
        let source = "a: {{ stage }}\nb: {{ 'lit' }}\nc: {{ 42 }}\n";
        let first = renderer.render(source, &ctx()).await.unwrap();
        let second = renderer.render(source, &ctx()).await.unwrap();
        assert_eq!(first, "a: prod\nb: lit\nc: 42\n");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_undefined_reference() {
        let err = Renderer::new()
            .render("x: {{ missing }}", &ctx())
            .await
            .unwrap_err();
        match err {
            RenderError::UndefinedReference { name, offset } => {
                assert_eq!(name, "missing");
                assert_eq!(offset, 3);
            }
            other => panic!("expected UndefinedReference, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_function() {
        let err = Renderer::new()
            .render("{{ upper('x') }}", &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::UndefinedReference { ref name, .. } if name == "upper()"));
    }

    #[tokio::test]
    async fn test_env_builtin() {
        let expected = std::env::var("PATH").unwrap_or_default();
        let out = Renderer::new()
            .render("{{ env(\"PATH\") }}", &Context::new())
            .await
            .unwrap();
        assert_eq!(out, expected);
        assert!(!out.contains("{{"));
    }

    #[tokio::test]
    async fn test_env_unset_is_empty() {
        let out = Renderer::new()
            .render("[{{ env('MU_TEST_SURELY_UNSET_VARIABLE') }}]", &Context::new())
            .await
            .unwrap();
        assert_eq!(out, "[]");
    }

    #[tokio::test]
    async fn test_env_argument_from_context() {
        let ctx = ContextBuilder::new().with_var("var", "PATH").build();
        let out = Renderer::new().render("{{ env(var) }}", &ctx).await.unwrap();
        assert_eq!(out, std::env::var("PATH").unwrap_or_default());
    }

    #[tokio::test]
    async fn test_env_bad_arguments() {
        let renderer = Renderer::new();
        for source in ["{{ env(123) }}", "{{ env() }}", "{{ env('A', 'B') }}"] {
            let err = renderer.render(source, &Context::new()).await.unwrap_err();
            assert!(
                matches!(err, RenderError::BadBuiltinArgument { ref function, .. } if function == "env"),
                "{source}: got {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_cmd_uses_runner_in_order() {
        let runner = FakeRunner::new();
        let renderer = Renderer::with_runner(runner.clone());
        let out = renderer
            .render("{{ cmd('one') }} and {{ cmd(\"two\") }}", &Context::new())
            .await
            .unwrap();
        assert_eq!(out, "out:one and out:two");
        assert_eq!(runner.calls(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_cmd_failure_stops_render() {
        let runner = FakeRunner::new();
        let renderer = Renderer::with_runner(runner.clone());
        let err = renderer
            .render("{{ cmd('fail') }} {{ cmd('after') }}", &Context::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::BuiltinExecutionFailed { .. }));
        assert_eq!(err.exit_code(), Some(1));
        assert_eq!(runner.calls(), vec!["fail"]);
    }

    #[tokio::test]
    async fn test_cmd_timeout_is_execution_failure() {
        let renderer = Renderer::with_runner(FakeRunner::new());
        let err = renderer
            .render("{{ cmd('hang') }}", &Context::new())
            .await
            .unwrap_err();
        match err {
            RenderError::BuiltinExecutionFailed {
                source: mu_core::Error::Timeout { timeout, .. },
                ..
            } => assert_eq!(timeout, DEFAULT_COMMAND_TIMEOUT),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cmd_bad_argument() {
        let runner = FakeRunner::new();
        let renderer = Renderer::with_runner(runner.clone());
        let err = renderer
            .render("{{ cmd(1) }}", &Context::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::BadBuiltinArgument { ref function, .. } if function == "cmd"));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_template_runs_nothing() {
        let runner = FakeRunner::new();
        let renderer = Renderer::with_runner(runner.clone());
        let err = renderer
            .render("{{ cmd('one') }} {{ broken", &Context::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::MalformedExpression { offset: 17, .. }));
        assert!(runner.calls().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cmd_with_shell() {
        let expected = std::process::Command::new("sh")
            .args(["-c", "whoami"])
            .output()
            .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
            .unwrap();
        let out = render(
            "{{ cmd(\"whoami | xargs echo\") }}",
            &Context::new(),
            DEFAULT_COMMAND_TIMEOUT,
        )
        .await
        .unwrap();
        assert_eq!(out, expected);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cmd_exit_1_with_shell() {
        let err = render("{{ cmd(\"exit 1\") }}", &Context::new(), DEFAULT_COMMAND_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::BuiltinExecutionFailed { .. }));
        assert_eq!(err.exit_code(), Some(1));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cmd_timeout_with_shell() {
        let err = render("{{ cmd('sleep 5') }}", &Context::new(), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RenderError::BuiltinExecutionFailed {
                source: mu_core::Error::Timeout { .. },
                ..
            }
        ));
    }
}
