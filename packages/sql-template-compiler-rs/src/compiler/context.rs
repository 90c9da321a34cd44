#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionParameter {
    pub name: String,
    #[serde(rename = "paramType")]
    pub param_type: TypeDescriptor,
}

/// Declared parameters of the template function. Used only to seed the root
/// environment with sample values for static type inference.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FunctionDefinition {
    pub parameters: Vec<FunctionParameter>,
}

/// Per-compilation registry of expressions, lexical environments, dialect and
/// configuration. One per compiled statement; mutated only through its owning
/// builder.
#[derive(Debug)]
pub struct GenerationContext {
    dialect: Dialect,
    expressions: Vec<Expression>,
    expression_indexes: HashMap<(String, usize), usize>,
    environments: Vec<Environment>,
    system_fields: Vec<SystemFieldConfig>,
    type_overrides: HashMap<Position, TypeDescriptor>,
}

impl GenerationContext {
    pub fn new(options: &CompileOptions) -> Self {
        let mut root_variables = Vec::new();
        if let Some(function) = &options.function {
            for parameter in &function.parameters {
                root_variables.push(EnvVariable {
                    name: parameter.name.clone(),
                    sample_value: sample_value_for(&parameter.param_type),
                    descriptor: parameter.param_type.clone(),
                });
            }
        }

        let root = Environment {
            index: 0,
            parent: None,
            variables: root_variables,
            label: "root".to_string(),
        };

        Self {
            dialect: options.dialect,
            expressions: Vec::new(),
            expression_indexes: HashMap::new(),
            environments: vec![root],
            system_fields: options
                .config
                .as_ref()
                .map(|config| config.system_fields.clone())
                .unwrap_or_default(),
            type_overrides: options.type_overrides.clone(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn system_fields(&self) -> &[SystemFieldConfig] {
        &self.system_fields
    }

    /// Registers an expression, de-duplicating by `(text, env_index)`.
    pub fn add_expression(&mut self, text: &str, env_index: usize, position: Position) -> usize {
        let key = (text.to_string(), env_index);
        if let Some(index) = self.expression_indexes.get(&key) {
            return *index;
        }

        let descriptor = self.resolve_descriptor(text, env_index, position);
        let result_type = descriptor
            .as_ref()
            .map(determine_eval_result_type)
            .unwrap_or(EvalResultType::Unknown);

        let id = self.expressions.len();
        self.expressions.push(Expression {
            id,
            expression: text.to_string(),
            env_index,
            position,
            type_descriptor: descriptor,
            result_type,
        });
        self.expression_indexes.insert(key, id);
        id
    }

    pub fn add_environment(&mut self, parent: usize, variable: EnvVariable, label: String) -> usize {
        let index = self.environments.len();
        self.environments.push(Environment {
            index,
            parent: Some(parent),
            variables: vec![variable],
            label,
        });
        index
    }

    pub fn expression(&self, index: usize) -> Option<&Expression> {
        self.expressions.get(index)
    }

    /// Statically resolves the descriptor of an expression, preferring the
    /// externally supplied position lookup over environment-chain resolution.
    pub fn resolve_descriptor(
        &self,
        text: &str,
        env_index: usize,
        position: Position,
    ) -> Option<TypeDescriptor> {
        if let Some(descriptor) = self.type_overrides.get(&position) {
            return Some(descriptor.clone());
        }
        self.resolve_path_descriptor(text, env_index)
    }

    /// Resolves `name` or `name.field.field` through the environment chain.
    /// Anything that is not a plain dotted identifier path stays unresolved.
    pub fn resolve_path_descriptor(&self, text: &str, env_index: usize) -> Option<TypeDescriptor> {
        let trimmed = text.trim();
        if trimmed.is_empty() || !is_identifier_path(trimmed) {
            return None;
        }

        let mut segments = trimmed.split('.');
        let head = segments.next()?;
        let root = self.lookup_variable(head, env_index)?;
        let rest: Vec<&str> = segments.collect();
        walk_descriptor_path(&root.descriptor, &rest).cloned()
    }

    fn lookup_variable(&self, name: &str, env_index: usize) -> Option<&EnvVariable> {
        let mut current = Some(env_index);
        while let Some(index) = current {
            let env = self.environments.get(index)?;
            if let Some(variable) = env.variables.iter().find(|v| v.name == name) {
                return Some(variable);
            }
            current = env.parent;
        }
        None
    }

    pub fn into_tables(self) -> (Vec<Expression>, Vec<Environment>) {
        (self.expressions, self.environments)
    }
}

fn is_identifier_path(text: &str) -> bool {
    !text.is_empty()
        && text.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !segment.chars().next().unwrap_or('0').is_ascii_digit()
        })
}
