use napi_derive::napi;

use crate::model::Dialect;
use crate::tokens::ParsedStatement;
use crate::{compile_statement, CompileOptions, Config, FunctionDefinition};

#[napi(object)]
pub struct JsCompileOptions {
    pub dialect: Option<String>,
    /// JSON-encoded system field configuration.
    pub config_json: Option<String>,
    /// JSON-encoded template function definition.
    pub function_json: Option<String>,
}

#[napi(js_name = "compileTemplateJson")]
pub fn compile_template_json(
    statement_json: String,
    options: Option<JsCompileOptions>,
) -> napi::Result<String> {
    let statement: ParsedStatement = serde_json::from_str(&statement_json)
        .map_err(|err| napi::Error::from_reason(err.to_string()))?;

    let mut compile_options = CompileOptions::default();
    if let Some(options) = options {
        if let Some(dialect) = options.dialect {
            compile_options.dialect = parse_dialect(&dialect)?;
        }
        if let Some(config_json) = options.config_json {
            let config: Config = serde_json::from_str(&config_json)
                .map_err(|err| napi::Error::from_reason(err.to_string()))?;
            compile_options.config = Some(config);
        }
        if let Some(function_json) = options.function_json {
            let function: FunctionDefinition = serde_json::from_str(&function_json)
                .map_err(|err| napi::Error::from_reason(err.to_string()))?;
            compile_options.function = Some(function);
        }
    }

    let compiled = compile_statement(&statement, &compile_options)
        .map_err(|err| napi::Error::from_reason(err.to_string()))?;

    Ok(compiled.template_json)
}

fn parse_dialect(value: &str) -> napi::Result<Dialect> {
    match value {
        "postgres" => Ok(Dialect::Postgres),
        "mysql" => Ok(Dialect::Mysql),
        "mariadb" => Ok(Dialect::Mariadb),
        "sqlite" => Ok(Dialect::Sqlite),
        other => Err(napi::Error::from_reason(format!(
            "unknown dialect '{other}'"
        ))),
    }
}
