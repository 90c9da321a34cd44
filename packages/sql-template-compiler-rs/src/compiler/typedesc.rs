/// Closed descriptor for statically-known template value types.
///
/// The external type-inference step supplies these per directive position;
/// function parameter declarations supply them for the root environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum TypeDescriptor {
    #[serde(rename = "scalar")]
    Scalar { name: String },
    #[serde(rename = "array")]
    Array { element: Box<TypeDescriptor> },
    #[serde(rename = "object")]
    Object {
        fields: BTreeMap<String, TypeDescriptor>,
    },
    #[serde(rename = "unknown")]
    Unknown,
}

impl TypeDescriptor {
    pub fn scalar(name: impl Into<String>) -> Self {
        TypeDescriptor::Scalar { name: name.into() }
    }

    pub fn array(element: TypeDescriptor) -> Self {
        TypeDescriptor::Array {
            element: Box::new(element),
        }
    }

    pub fn object(fields: impl IntoIterator<Item = (String, TypeDescriptor)>) -> Self {
        TypeDescriptor::Object {
            fields: fields.into_iter().collect(),
        }
    }

    /// Element descriptor when iterating this value with a `for` directive.
    pub fn element(&self) -> TypeDescriptor {
        match self {
            TypeDescriptor::Array { element } => (**element).clone(),
            _ => TypeDescriptor::Unknown,
        }
    }

    pub fn field(&self, name: &str) -> Option<&TypeDescriptor> {
        match self {
            TypeDescriptor::Object { fields } => fields.get(name),
            _ => None,
        }
    }

    pub fn field_names(&self) -> Vec<&str> {
        match self {
            TypeDescriptor::Object { fields } => fields.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EvalResultType {
    Unknown,
    Scalar,
    Array,
    Object,
    ArrayOfObject,
}

pub fn determine_eval_result_type(descriptor: &TypeDescriptor) -> EvalResultType {
    match descriptor {
        TypeDescriptor::Scalar { .. } => EvalResultType::Scalar,
        TypeDescriptor::Array { element } => match **element {
            TypeDescriptor::Object { .. } => EvalResultType::ArrayOfObject,
            _ => EvalResultType::Array,
        },
        TypeDescriptor::Object { .. } => EvalResultType::Object,
        TypeDescriptor::Unknown => EvalResultType::Unknown,
    }
}

/// Synthesizes a dummy JSON value for a descriptor. These are only ever used
/// as environment sample values for static inference, never emitted.
pub fn sample_value_for(descriptor: &TypeDescriptor) -> Value {
    match descriptor {
        TypeDescriptor::Scalar { name } => match name.as_str() {
            "int" | "integer" | "bigint" | "smallint" => Value::Number(Number::from(0)),
            "float" | "double" | "decimal" | "numeric" => {
                Number::from_f64(0.0).map(Value::Number).unwrap_or(Value::Null)
            }
            "bool" | "boolean" => Value::Bool(false),
            _ => Value::String(String::new()),
        },
        TypeDescriptor::Array { .. } => Value::Array(Vec::new()),
        TypeDescriptor::Object { fields } => {
            let mut map = JsonMap::new();
            for (name, field) in fields {
                map.insert(name.clone(), sample_value_for(field));
            }
            Value::Object(map)
        }
        TypeDescriptor::Unknown => Value::Null,
    }
}

/// Walks a dotted path (`a.b.c`) through object descriptors. The first
/// segment is looked up by the caller against an environment chain.
pub fn walk_descriptor_path<'a>(
    root: &'a TypeDescriptor,
    segments: &[&str],
) -> Option<&'a TypeDescriptor> {
    let mut current = root;
    for segment in segments {
        current = current.field(segment)?;
    }
    Some(current)
}
