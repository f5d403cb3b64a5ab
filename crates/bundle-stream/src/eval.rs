//! Config module evaluation.
//!
//! The config loader bundles a config file into CommonJS, installs the
//! generated code in the [`loader`](crate::loader) hook, and asks a
//! [`ModuleEvaluator`] for the module's exports as JSON.
//!
//! With the `eval` feature, [`BoaEvaluator`] runs the module in an embedded
//! Boa JavaScript engine with a CommonJS scope (`module`, `exports`,
//! `require`, `__filename`, `__dirname`). Every module source, the entry
//! included, is read through the loader hook. `require` resolves relative and
//! absolute specifiers (trying `.js`, `.cjs`, `.json` and `/index.js`) and
//! provides a POSIX `path` builtin; any other bare specifier fails with
//! "Cannot find module". Functions in the exported object (plugins, hooks)
//! cannot cross into Rust and are dropped.

use std::fmt;
use std::path::Path;

use serde_json::Value;

use crate::Result;

/// Evaluates CommonJS modules and returns their exports.
pub trait ModuleEvaluator: Send + Sync + fmt::Debug {
    /// Evaluate the module at `path`.
    ///
    /// The module source and anything it requires are read through
    /// [`loader::load`](crate::loader::load). An exception thrown by the
    /// module is reported as
    /// [`Error::ConfigEvaluation`](crate::Error::ConfigEvaluation) with the
    /// thrown message preserved.
    fn evaluate(&self, path: &Path) -> Result<Value>;
}

/// The evaluator used when the caller does not supply one.
pub fn default_evaluator() -> Option<std::sync::Arc<dyn ModuleEvaluator>> {
    #[cfg(feature = "eval")]
    {
        Some(std::sync::Arc::new(BoaEvaluator))
    }

    #[cfg(not(feature = "eval"))]
    {
        None
    }
}

/// Name of the host function the CommonJS runtime reads modules through.
pub const LOAD_FUNCTION: &str = "__loadModule";

/// A CommonJS runtime that evaluates `entry` and yields the JSON text of its
/// exports.
///
/// Module sources come from the host function [`LOAD_FUNCTION`], which takes
/// an absolute path and returns the source or `null`. An ES-module interop
/// object (`__esModule` with a `default` export) is unwrapped to its default
/// export.
pub fn commonjs_runtime(entry: &Path, cwd: &Path) -> String {
    let entry = Value::String(entry.display().to_string()).to_string();
    let cwd = Value::String(cwd.display().to_string()).to_string();

    format!(
        r#"(function () {{
  var __entry = {entry};
  var __cwd = {cwd};
  var load = {LOAD_FUNCTION};

  function normalize(p) {{
    p = String(p).replace(/\\/g, "/");
    var absolute = p.charAt(0) === "/";
    var out = [];
    var parts = p.split("/");
    for (var i = 0; i < parts.length; i++) {{
      var part = parts[i];
      if (part === "" || part === ".") continue;
      if (part === "..") {{
        if (out.length && out[out.length - 1] !== "..") out.pop();
        else if (!absolute) out.push("..");
      }} else {{
        out.push(part);
      }}
    }}
    var joined = out.join("/");
    return absolute ? "/" + joined : (joined || ".");
  }}
  function dirname(p) {{
    var n = normalize(p);
    var i = n.lastIndexOf("/");
    if (i < 0) return ".";
    if (i === 0) return "/";
    return n.slice(0, i);
  }}
  function basename(p, ext) {{
    var n = normalize(p);
    var b = n.slice(n.lastIndexOf("/") + 1);
    if (ext && b.length > ext.length && b.slice(-ext.length) === ext) b = b.slice(0, -ext.length);
    return b;
  }}
  function extname(p) {{
    var b = basename(p);
    var i = b.lastIndexOf(".");
    return i > 0 ? b.slice(i) : "";
  }}

  var path = {{
    sep: "/",
    delimiter: ":",
    normalize: normalize,
    dirname: dirname,
    basename: basename,
    extname: extname,
    isAbsolute: function (p) {{ return String(p).charAt(0) === "/"; }},
    join: function () {{
      return normalize(Array.prototype.slice.call(arguments).join("/"));
    }},
    resolve: function () {{
      var resolved = "";
      for (var i = arguments.length - 1; i >= 0 && resolved.charAt(0) !== "/"; i--) {{
        var segment = String(arguments[i]);
        if (segment === "") continue;
        resolved = resolved ? segment + "/" + resolved : segment;
      }}
      if (resolved.charAt(0) !== "/") resolved = __cwd + "/" + resolved;
      return normalize(resolved);
    }}
  }};
  path.posix = path;

  var builtins = {{ path: path }};
  var cache = {{}};

  function locate(request) {{
    var candidates = [request, request + ".js", request + ".cjs", request + ".json", request + "/index.js"];
    for (var i = 0; i < candidates.length; i++) {{
      var source = load(candidates[i]);
      if (source !== null) return {{ file: candidates[i], source: source }};
    }}
    return null;
  }}

  function makeRequire(from) {{
    var fromDir = dirname(from);
    return function require(id) {{
      id = String(id);
      var bare = id.replace(/^node:/, "");
      if (Object.prototype.hasOwnProperty.call(builtins, bare)) return builtins[bare];
      var relative = id.charAt(0) === "/" || id.slice(0, 2) === "./" || id.slice(0, 3) === "../";
      var found = relative ? locate(normalize(id.charAt(0) === "/" ? id : fromDir + "/" + id)) : null;
      if (!found) throw new Error("Cannot find module '" + id + "' from " + from);
      return execute(found.file, found.source);
    }};
  }}

  function execute(file, source) {{
    if (cache[file]) return cache[file].exports;
    var module = {{ exports: {{}}, filename: file, loaded: false }};
    cache[file] = module;
    if (extname(file) === ".json") {{
      module.exports = JSON.parse(source);
    }} else {{
      var fn = (0, eval)("(function (exports, require, module, __filename, __dirname) {{" + source + "\n}})");
      fn.call(module.exports, module.exports, makeRequire(file), module, file, dirname(file));
    }}
    module.loaded = true;
    return module.exports;
  }}

  var entrySource = load(__entry);
  if (entrySource === null) throw new Error("Cannot find module '" + __entry + "'");
  var result = execute(__entry, entrySource);
  if (result && result.__esModule && "default" in result) {{
    result = result["default"];
  }}
  return JSON.stringify(result);
}})()"#
    )
}

#[cfg(feature = "eval")]
pub use boa::BoaEvaluator;

#[cfg(feature = "eval")]
mod boa {
    use std::path::{Path, PathBuf};

    use boa_engine::{Context, JsNativeError, JsResult, JsString, JsValue, NativeFunction, Source};
    use serde_json::Value;

    use super::{LOAD_FUNCTION, ModuleEvaluator, commonjs_runtime};
    use crate::{Error, Result, loader};

    /// Evaluates config modules in a fresh Boa context per call.
    ///
    /// Evaluation is synchronous; async callers run it on a blocking thread.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct BoaEvaluator;

    /// Host side of the runtime's module reads. Unreadable paths yield `null`
    /// so the runtime can try the next resolution candidate.
    fn load_module(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
        let path = args
            .first()
            .cloned()
            .unwrap_or_default()
            .to_string(context)?
            .to_std_string_escaped();

        match loader::load(Path::new(&path)) {
            Ok(source) => Ok(JsValue::from(JsString::from(source.as_str()))),
            Err(Error::Io { .. }) => Ok(JsValue::null()),
            Err(err) => Err(JsNativeError::error().with_message(err.to_string()).into()),
        }
    }

    impl ModuleEvaluator for BoaEvaluator {
        fn evaluate(&self, path: &Path) -> Result<Value> {
            tracing::trace!("Evaluating config module: {}", path.display());

            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
            let runtime = commonjs_runtime(path, &cwd);

            let mut context = Context::default();
            context
                .register_global_callable(
                    JsString::from(LOAD_FUNCTION),
                    1,
                    NativeFunction::from_fn_ptr(load_module),
                )
                .map_err(|e| Error::ConfigEvaluation(e.to_string()))?;

            let result = context
                .eval(Source::from_bytes(runtime.as_bytes()))
                .map_err(|e| Error::ConfigEvaluation(format!("{}: {}", path.display(), e)))?;

            let Some(json) = result.as_string() else {
                return Err(Error::InvalidConfig(format!(
                    "{} does not export a value",
                    path.display()
                )));
            };

            serde_json::from_str(&json.to_std_string_escaped()).map_err(|e| {
                Error::InvalidConfig(format!(
                    "exports of {} are not JSON-compatible: {}",
                    path.display(),
                    e
                ))
            })
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use serde_json::json;
        use serial_test::serial;
        use tempfile::TempDir;

        const CONFIG: &str = "/project/rollup.config.js";

        fn eval(source: &str) -> Result<Value> {
            let _guard = loader::override_module(CONFIG, source);
            BoaEvaluator.evaluate(Path::new(CONFIG))
        }

        #[test]
        #[serial(module_loader)]
        fn module_exports_object() {
            let value = eval("module.exports = { input: 'main.js', output: { format: 'cjs' } };")
                .unwrap();
            assert_eq!(value, json!({ "input": "main.js", "output": { "format": "cjs" } }));
        }

        #[test]
        #[serial(module_loader)]
        fn es_module_interop_default_is_unwrapped() {
            let value = eval(
                "'use strict';\n\
                 Object.defineProperty(exports, '__esModule', { value: true });\n\
                 exports.default = { input: 'main.js' };",
            )
            .unwrap();
            assert_eq!(value, json!({ "input": "main.js" }));
        }

        #[test]
        #[serial(module_loader)]
        fn thrown_errors_keep_their_message() {
            let err = eval("throw new Error('config exploded');").unwrap_err();
            assert!(matches!(err, Error::ConfigEvaluation(_)));
            assert!(err.to_string().contains("config exploded"));
        }

        #[test]
        #[serial(module_loader)]
        fn unknown_bare_specifier_is_reported() {
            let err = eval("module.exports = require('left-pad');").unwrap_err();
            assert!(matches!(err, Error::ConfigEvaluation(_)));
            assert!(err.to_string().contains("Cannot find module 'left-pad'"));
        }

        #[test]
        #[serial(module_loader)]
        fn path_builtin_is_available() {
            let value = eval(
                "const path = require('path');\n\
                 const { join } = require('node:path');\n\
                 module.exports = {\n\
                   input: path.join('src', './lib', '..', 'app.js'),\n\
                   dir: path.resolve(__dirname, 'dist'),\n\
                   name: path.basename(join('a', 'b.js'), '.js'),\n\
                   ext: path.extname('x/y.mjs'),\n\
                 };",
            )
            .unwrap();
            assert_eq!(
                value,
                json!({ "input": "src/app.js", "dir": "/project/dist", "name": "b", "ext": ".mjs" })
            );
        }

        #[test]
        #[serial(module_loader)]
        fn sibling_modules_resolve_through_the_loader() {
            let dir = TempDir::new().unwrap();
            std::fs::write(dir.path().join("shared.json"), r#"{ "external": ["fs"] }"#).unwrap();
            std::fs::create_dir(dir.path().join("lib")).unwrap();
            std::fs::write(
                dir.path().join("lib/index.js"),
                "exports.output = { format: 'cjs' };",
            )
            .unwrap();

            let config = dir.path().join("rollup.config.js");
            std::fs::write(&config, "module.exports = 'stale contents on disk';").unwrap();

            let _guard = loader::override_module(
                &config,
                "const shared = require('./shared.json');\n\
                 const lib = require('./lib');\n\
                 module.exports = { input: 'a.js', external: shared.external, output: lib.output };",
            );
            let value = BoaEvaluator.evaluate(&config).unwrap();
            assert_eq!(
                value,
                json!({ "input": "a.js", "external": ["fs"], "output": { "format": "cjs" } })
            );
        }

        #[test]
        #[serial(module_loader)]
        fn missing_relative_module_is_reported() {
            let err = eval("require('./nope');").unwrap_err();
            assert!(err.to_string().contains("Cannot find module './nope'"));
        }

        #[test]
        #[serial(module_loader)]
        fn functions_are_dropped_from_exports() {
            let value =
                eval("module.exports = { input: 'a.js', plugins: [], onwarn: function () {} };")
                    .unwrap();
            assert_eq!(value, json!({ "input": "a.js", "plugins": [] }));
        }

        #[test]
        #[serial(module_loader)]
        fn filename_and_dirname_are_set() {
            let value = eval("module.exports = { file: __filename, dir: __dirname };").unwrap();
            assert_eq!(
                value,
                json!({ "file": "/project/rollup.config.js", "dir": "/project" })
            );
        }

        #[test]
        #[serial(module_loader)]
        fn undefined_export_is_invalid() {
            let err = eval("module.exports = undefined;").unwrap_err();
            assert!(matches!(err, Error::InvalidConfig(_)));
        }
    }
}
