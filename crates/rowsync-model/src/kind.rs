//! Catalogue of reconcilable child collections.
//!
//! # Design
//! - Each [`ChildKind`] carries its own table descriptor, business-key
//!   extractor, diff policy and nested kinds, so the engine never branches on
//!   table names.
//! - Link tables (`updates: false`) match on their full key and are only ever
//!   inserted or deleted.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::condition::{Condition, ConditionType};
use crate::value::{FieldValue, Fields};

/// Physical table a collection lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableSpec {
    /// Table name.
    pub name: &'static str,
    /// Primary key column.
    pub id_column: &'static str,
    /// Foreign key column pointing at the owning row; empty for root tables.
    pub parent_column: &'static str,
}

impl TableSpec {
    /// Child table owned through `parent_column`.
    #[must_use]
    pub const fn child(
        name: &'static str,
        id_column: &'static str,
        parent_column: &'static str,
    ) -> Self {
        Self {
            name,
            id_column,
            parent_column,
        }
    }

    /// Table whose rows are not owned by another row.
    #[must_use]
    pub const fn root(name: &'static str, id_column: &'static str) -> Self {
        Self {
            name,
            id_column,
            parent_column: "",
        }
    }

    /// Whether the table has a parent column.
    #[must_use]
    pub const fn has_parent(&self) -> bool {
        !self.parent_column.is_empty()
    }
}

/// Entity that owns a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOwner {
    /// Alerting action.
    Action,
    /// Low-level discovery rule.
    DiscoveryRule,
    /// Override of a discovery rule.
    Override,
}

const ACTIONS: TableSpec = TableSpec::root("actions", "actionid");
const ITEMS: TableSpec = TableSpec::child("items", "itemid", "hostid");
const LLD_OVERRIDE: TableSpec = TableSpec::child("lld_override", "lld_overrideid", "itemid");
const CONDITIONS: TableSpec = TableSpec::child("conditions", "conditionid", "actionid");
const ITEM_CONDITION: TableSpec =
    TableSpec::child("item_condition", "item_conditionid", "itemid");
const LLD_OVERRIDE_CONDITION: TableSpec = TableSpec::child(
    "lld_override_condition",
    "lld_override_conditionid",
    "lld_overrideid",
);
const OPERATIONS: TableSpec = TableSpec::child("operations", "operationid", "actionid");
const OPCONDITIONS: TableSpec = TableSpec::child("opconditions", "opconditionid", "operationid");
const OPMESSAGE_GRP: TableSpec =
    TableSpec::child("opmessage_grp", "opmessage_grpid", "operationid");
const OPMESSAGE_USR: TableSpec =
    TableSpec::child("opmessage_usr", "opmessage_usrid", "operationid");
const OPTAG: TableSpec = TableSpec::child("optag", "optagid", "operationid");
const OPMESSAGE: TableSpec = TableSpec::child("opmessage", "opmessageid", "operationid");
const OPCOMMAND: TableSpec = TableSpec::child("opcommand", "opcommandid", "operationid");
const OPCOMMAND_HST: TableSpec =
    TableSpec::child("opcommand_hst", "opcommand_hstid", "operationid");
const OPCOMMAND_GRP: TableSpec =
    TableSpec::child("opcommand_grp", "opcommand_grpid", "operationid");
const OPGROUP: TableSpec = TableSpec::child("opgroup", "opgroupid", "operationid");
const OPTEMPLATE: TableSpec = TableSpec::child("optemplate", "optemplateid", "operationid");
const OPINVENTORY: TableSpec = TableSpec::child("opinventory", "opinventoryid", "operationid");
const LLD_MACRO_PATH: TableSpec = TableSpec::child("lld_macro_path", "lld_macro_pathid", "itemid");
const LLD_OVERRIDE_OPERATION: TableSpec = TableSpec::child(
    "lld_override_operation",
    "lld_override_operationid",
    "lld_overrideid",
);
const LLD_OVERRIDE_OPTAG: TableSpec = TableSpec::child(
    "lld_override_optag",
    "lld_override_optagid",
    "lld_override_operationid",
);
const LLD_OVERRIDE_OPTEMPLATE: TableSpec = TableSpec::child(
    "lld_override_optemplate",
    "lld_override_optemplateid",
    "lld_override_operationid",
);
const HOST_TAG: TableSpec = TableSpec::child("host_tag", "hosttagid", "hostid");
const HOSTMACRO: TableSpec = TableSpec::child("hostmacro", "hostmacroid", "hostid");
const HOSTS_GROUPS: TableSpec = TableSpec::child("hosts_groups", "hostgroupid", "hostid");
const HOSTS_TEMPLATES: TableSpec = TableSpec::child("hosts_templates", "hosttemplateid", "hostid");

impl FilterOwner {
    /// Column on the owner row holding the evaluation type.
    pub const EVALTYPE_COLUMN: &'static str = "evaltype";
    /// Column on the owner row holding the numeric formula.
    pub const FORMULA_COLUMN: &'static str = "formula";

    /// Table holding the owner rows.
    #[must_use]
    pub const fn table(self) -> &'static TableSpec {
        match self {
            Self::Action => &ACTIONS,
            Self::DiscoveryRule => &ITEMS,
            Self::Override => &LLD_OVERRIDE,
        }
    }

    /// Child kind of the owner's condition rows.
    #[must_use]
    pub const fn condition_kind(self) -> ChildKind {
        ChildKind::Condition(self)
    }
}

/// Reconcilable child collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildKind {
    /// Filter conditions of an owner.
    Condition(FilterOwner),
    /// Action operations.
    Operation,
    /// Conditions of an action operation.
    OpCondition,
    /// User groups notified by an operation.
    OpMessageGroup,
    /// Users notified by an operation.
    OpMessageUser,
    /// Tags set by an operation.
    OpTag,
    /// Message settings of a notification operation; at most one per operation.
    OpMessage,
    /// Script settings of a command operation; at most one per operation.
    OpCommand,
    /// Hosts a command operation runs on.
    OpCommandHost,
    /// Host groups a command operation runs on.
    OpCommandGroup,
    /// Host groups added or removed by an operation.
    OpGroup,
    /// Templates linked or unlinked by an operation.
    OpTemplate,
    /// Inventory mode set by an operation; at most one per operation.
    OpInventory,
    /// Discovery rule macro paths.
    MacroPath,
    /// Discovery rule overrides.
    Override,
    /// Operations of an override.
    OverrideOperation,
    /// Tags applied by an override operation.
    OverrideOpTag,
    /// Templates linked by an override operation.
    OverrideOpTemplate,
    /// Host tags.
    HostTag,
    /// Host user macros.
    HostMacro,
    /// Host group membership.
    GroupLink,
    /// Linked templates.
    TemplateLink,
}

impl ChildKind {
    /// Table the collection is stored in.
    #[must_use]
    pub const fn table(self) -> &'static TableSpec {
        match self {
            Self::Condition(FilterOwner::Action) => &CONDITIONS,
            Self::Condition(FilterOwner::DiscoveryRule) => &ITEM_CONDITION,
            Self::Condition(FilterOwner::Override) => &LLD_OVERRIDE_CONDITION,
            Self::Operation => &OPERATIONS,
            Self::OpCondition => &OPCONDITIONS,
            Self::OpMessageGroup => &OPMESSAGE_GRP,
            Self::OpMessageUser => &OPMESSAGE_USR,
            Self::OpTag => &OPTAG,
            Self::OpMessage => &OPMESSAGE,
            Self::OpCommand => &OPCOMMAND,
            Self::OpCommandHost => &OPCOMMAND_HST,
            Self::OpCommandGroup => &OPCOMMAND_GRP,
            Self::OpGroup => &OPGROUP,
            Self::OpTemplate => &OPTEMPLATE,
            Self::OpInventory => &OPINVENTORY,
            Self::MacroPath => &LLD_MACRO_PATH,
            Self::Override => &LLD_OVERRIDE,
            Self::OverrideOperation => &LLD_OVERRIDE_OPERATION,
            Self::OverrideOpTag => &LLD_OVERRIDE_OPTAG,
            Self::OverrideOpTemplate => &LLD_OVERRIDE_OPTEMPLATE,
            Self::HostTag => &HOST_TAG,
            Self::HostMacro => &HOSTMACRO,
            Self::GroupLink => &HOSTS_GROUPS,
            Self::TemplateLink => &HOSTS_TEMPLATES,
        }
    }

    /// Stable label used in logs and metrics.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Condition(FilterOwner::Action) => "action_condition",
            Self::Condition(FilterOwner::DiscoveryRule) => "discovery_rule_condition",
            Self::Condition(FilterOwner::Override) => "override_condition",
            Self::Operation => "operation",
            Self::OpCondition => "opcondition",
            Self::OpMessageGroup => "opmessage_group",
            Self::OpMessageUser => "opmessage_user",
            Self::OpTag => "optag",
            Self::OpMessage => "opmessage",
            Self::OpCommand => "opcommand",
            Self::OpCommandHost => "opcommand_host",
            Self::OpCommandGroup => "opcommand_group",
            Self::OpGroup => "opgroup",
            Self::OpTemplate => "optemplate",
            Self::OpInventory => "opinventory",
            Self::MacroPath => "macro_path",
            Self::Override => "override",
            Self::OverrideOperation => "override_operation",
            Self::OverrideOpTag => "override_optag",
            Self::OverrideOpTemplate => "override_optemplate",
            Self::HostTag => "host_tag",
            Self::HostMacro => "host_macro",
            Self::GroupLink => "group_link",
            Self::TemplateLink => "template_link",
        }
    }

    /// Kinds reconciled beneath rows of this kind.
    #[must_use]
    pub const fn nested(self) -> &'static [Self] {
        match self {
            Self::Operation => &[
                Self::OpCondition,
                Self::OpMessage,
                Self::OpMessageGroup,
                Self::OpMessageUser,
                Self::OpCommand,
                Self::OpCommandHost,
                Self::OpCommandGroup,
                Self::OpGroup,
                Self::OpTemplate,
                Self::OpInventory,
                Self::OpTag,
            ],
            Self::Override => &[Self::OverrideOperation],
            Self::OverrideOperation => &[Self::OverrideOpTag, Self::OverrideOpTemplate],
            _ => &[],
        }
    }

    /// Owner type when rows of this kind carry a filter.
    #[must_use]
    pub const fn filter_owner(self) -> Option<FilterOwner> {
        match self {
            Self::Override => Some(FilterOwner::Override),
            _ => None,
        }
    }

    /// Whether matched rows may receive sparse updates.
    #[must_use]
    pub const fn updatable(self) -> bool {
        !matches!(
            self,
            Self::OpMessageGroup
                | Self::OpMessageUser
                | Self::OpCommandHost
                | Self::OpCommandGroup
                | Self::OpGroup
                | Self::OpTemplate
                | Self::OpTag
                | Self::OverrideOperation
                | Self::OverrideOpTag
                | Self::OverrideOpTemplate
                | Self::GroupLink
                | Self::TemplateLink
        )
    }

    /// Unique sibling column that needs a placeholder rename when values swap.
    #[must_use]
    pub const fn rename_column(self) -> Option<&'static str> {
        match self {
            Self::Override => Some("name"),
            _ => None,
        }
    }

    /// Business key of a row of this kind.
    #[must_use]
    pub fn business_key(self, fields: &Fields) -> BusinessKey {
        match self {
            Self::Condition(owner) => condition_key(owner, fields),
            Self::Operation => BusinessKey::of(fields, &[("operationtype", None), ("recovery", ZERO)]),
            Self::OpCondition => BusinessKey::of(fields, &[("value", EMPTY)]),
            Self::OpMessageGroup => BusinessKey::of(fields, &[("usrgrpid", None)]),
            Self::OpMessageUser => BusinessKey::of(fields, &[("userid", None)]),
            Self::OpMessage | Self::OpCommand | Self::OpInventory => BusinessKey::of(fields, &[]),
            Self::OpCommandHost => BusinessKey::of(fields, &[("hostid", None)]),
            Self::OpTag | Self::OverrideOpTag | Self::HostTag => {
                BusinessKey::of(fields, &[("tag", None), ("value", EMPTY)])
            }
            Self::MacroPath => BusinessKey::of(fields, &[("lld_macro", None)]),
            Self::Override => BusinessKey::of(fields, &[("step", None)]),
            Self::OverrideOperation => BusinessKey::all(self.table(), fields),
            Self::OverrideOpTemplate | Self::OpTemplate | Self::TemplateLink => {
                BusinessKey::of(fields, &[("templateid", None)])
            }
            Self::HostMacro => BusinessKey::of(fields, &[("macro", None)]),
            Self::OpCommandGroup | Self::OpGroup | Self::GroupLink => {
                BusinessKey::of(fields, &[("groupid", None)])
            }
        }
    }

    /// Columns of `desired` whose values differ from `existing`.
    ///
    /// Only columns present in `desired` are compared; keys and bookkeeping
    /// columns are skipped. An empty result means no write is needed.
    #[must_use]
    pub fn diff(self, desired: &Fields, existing: &Fields) -> Fields {
        if !self.updatable() {
            return Fields::new();
        }
        let table = self.table();
        desired
            .iter()
            .filter(|(name, _)| {
                name.as_str() != table.id_column
                    && name.as_str() != table.parent_column
                    && !self.is_transient(name)
            })
            .filter(|(name, value)| existing.get(name.as_str()).unwrap_or(&FieldValue::Null) != *value)
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Columns carried on desired rows that are never persisted.
    #[must_use]
    pub fn is_transient(self, column: &str) -> bool {
        match self {
            Self::Condition(_) => column == "formulaid",
            _ => false,
        }
    }
}

impl fmt::Display for ChildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

const ZERO: Option<FieldValue> = Some(FieldValue::Int(0));
const EMPTY: Option<FieldValue> = Some(FieldValue::Text(String::new()));

/// Value tuple identifying a child among its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BusinessKey(Vec<FieldValue>);

impl BusinessKey {
    /// Key made of the named columns; absent columns use the given default or `NULL`.
    #[must_use]
    pub fn of(fields: &Fields, columns: &[(&str, Option<FieldValue>)]) -> Self {
        Self(
            columns
                .iter()
                .map(|(name, default)| {
                    fields
                        .get(*name)
                        .filter(|value| !value.is_null())
                        .cloned()
                        .or_else(|| default.clone())
                        .unwrap_or(FieldValue::Null)
                })
                .collect(),
        )
    }

    /// Key made of every own column of the row.
    #[must_use]
    pub fn all(table: &TableSpec, fields: &Fields) -> Self {
        Self(
            fields
                .iter()
                .filter(|(name, _)| {
                    name.as_str() != table.id_column && name.as_str() != table.parent_column
                })
                .flat_map(|(name, value)| [FieldValue::Text(name.clone()), value.clone()])
                .collect(),
        )
    }

    /// Key values in column order.
    #[must_use]
    pub fn values(&self) -> &[FieldValue] {
        &self.0
    }
}

impl fmt::Display for BusinessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (index, value) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str(")")
    }
}

fn condition_key(owner: FilterOwner, fields: &Fields) -> BusinessKey {
    if owner != FilterOwner::Action {
        // Discovery conditions keep the macro in value2.
        return BusinessKey::of(
            fields,
            &[
                (Condition::VALUE2, EMPTY),
                (Condition::OPERATOR, ZERO),
                (Condition::VALUE, EMPTY),
            ],
        );
    }
    let conditiontype = fields
        .get(Condition::CONDITIONTYPE)
        .and_then(FieldValue::as_i64)
        .map(ConditionType::new);
    match conditiontype {
        Some(ConditionType::SUPPRESSED) => {
            BusinessKey::of(fields, &[(Condition::CONDITIONTYPE, None)])
        }
        Some(ConditionType::EVENT_TAG_VALUE) => BusinessKey::of(
            fields,
            &[(Condition::CONDITIONTYPE, None), (Condition::VALUE2, EMPTY)],
        ),
        _ => BusinessKey::of(
            fields,
            &[(Condition::CONDITIONTYPE, None), (Condition::VALUE, EMPTY)],
        ),
    }
}
