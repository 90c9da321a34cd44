/// Compiler configuration: columns populated by the compiler rather than by
/// the caller (audit timestamps and the like).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(rename = "systemFields", default)]
    pub system_fields: Vec<SystemFieldConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemFieldConfig {
    pub name: String,
    #[serde(rename = "fieldType")]
    pub field_type: String,
    #[serde(rename = "onInsert", skip_serializing_if = "Option::is_none")]
    pub on_insert: Option<SystemFieldSource>,
    #[serde(rename = "onUpdate", skip_serializing_if = "Option::is_none")]
    pub on_update: Option<SystemFieldSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum SystemFieldSource {
    #[serde(rename = "default")]
    Default { value: String },
    #[serde(rename = "parameter")]
    Parameter { required: bool },
}

fn system_default_value(source: &SystemFieldSource, dialect: Dialect) -> Option<String> {
    match source {
        SystemFieldSource::Default { value } => {
            Some(normalize_default_expression(value, dialect))
        }
        SystemFieldSource::Parameter { .. } => None,
    }
}

fn contains_column(columns: &[String], name: &str) -> bool {
    columns.iter().any(|column| column.eq_ignore_ascii_case(name))
}

impl<'a> InstructionBuilder<'a> {
    /// Appends missing system column names before the closing paren of an
    /// INSERT column list.
    pub(crate) fn inject_insert_column_names(&mut self) {
        let Some(columns) = self.insert_columns.clone() else {
            return;
        };
        let fields: Vec<String> = self
            .ctx
            .system_fields()
            .iter()
            .filter(|field| field.on_insert.is_some())
            .filter(|field| !contains_column(&columns, &field.name))
            .map(|field| field.name.clone())
            .collect();
        for name in fields {
            self.push_static(&format!(", {name}"), None);
        }
    }

    /// Appends `, EMIT_SYSTEM_VALUE` pairs before the closing paren of a
    /// VALUES group. At most one block is appended per group.
    pub(crate) fn inject_insert_system_values(&mut self) {
        if self.values_block_emitted {
            return;
        }
        self.values_block_emitted = true;

        let Some(columns) = self.insert_columns.clone() else {
            return;
        };
        let dialect = self.ctx.dialect();
        let pending: Vec<(String, Option<String>)> = self
            .ctx
            .system_fields()
            .iter()
            .filter(|field| !contains_column(&columns, &field.name))
            .filter_map(|field| {
                field
                    .on_insert
                    .as_ref()
                    .map(|source| (field.name.clone(), system_default_value(source, dialect)))
            })
            .collect();

        for (field, default_value) in pending {
            self.push_static(", ", None);
            self.append(Instruction::EmitSystemValue {
                field,
                default_value,
            });
        }
    }

    /// Appends `, EMIT_SYSTEM_VALUE` pairs after the projection of an
    /// INSERT ... SELECT, mirroring the column names added to the INTO list.
    pub(crate) fn append_insert_select_system_fields(&mut self) {
        let Some(columns) = self.insert_columns.clone() else {
            return;
        };
        let dialect = self.ctx.dialect();
        let pending: Vec<(String, Option<String>)> = self
            .ctx
            .system_fields()
            .iter()
            .filter(|field| !contains_column(&columns, &field.name))
            .filter_map(|field| {
                field
                    .on_insert
                    .as_ref()
                    .map(|source| (field.name.clone(), system_default_value(source, dialect)))
            })
            .collect();

        for (field, default_value) in pending {
            self.push_static(", ", None);
            self.append(Instruction::EmitSystemValue {
                field,
                default_value,
            });
        }
    }

    /// Appends `, <name> = EMIT_SYSTEM_VALUE` for configured on-update fields
    /// missing from the explicit SET list.
    pub(crate) fn append_update_system_fields(&mut self, set_columns: &[String]) {
        let dialect = self.ctx.dialect();
        let pending: Vec<(String, Option<String>)> = self
            .ctx
            .system_fields()
            .iter()
            .filter(|field| !contains_column(set_columns, &field.name))
            .filter_map(|field| {
                field
                    .on_update
                    .as_ref()
                    .map(|source| (field.name.clone(), system_default_value(source, dialect)))
            })
            .collect();

        for (field, default_value) in pending {
            self.push_static(&format!(", {field} = "), None);
            self.append(Instruction::EmitSystemValue {
                field,
                default_value,
            });
        }
    }
}
