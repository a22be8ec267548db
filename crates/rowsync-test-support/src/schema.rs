//! Tables the engine reconciles, for Postgres-backed tests.
//!
//! Ids are `bigserial` so stores can reserve them from the owning sequence.
//! Child rows cascade with their parent; `lld_override` keeps `name` and
//! `step` unique per discovery rule.

use anyhow::{Context, Result};
use postgres::Client;

const SCHEMA: &str = r"
CREATE TABLE hosts (
    hostid bigserial PRIMARY KEY,
    host text NOT NULL DEFAULT ''
);

CREATE TABLE actions (
    actionid bigserial PRIMARY KEY,
    name text NOT NULL DEFAULT '',
    evaltype integer NOT NULL DEFAULT 0,
    formula text NOT NULL DEFAULT ''
);

CREATE TABLE conditions (
    conditionid bigserial PRIMARY KEY,
    actionid bigint NOT NULL REFERENCES actions ON DELETE CASCADE,
    conditiontype integer NOT NULL DEFAULT 0,
    operator integer NOT NULL DEFAULT 0,
    value text NOT NULL DEFAULT '',
    value2 text NOT NULL DEFAULT ''
);

CREATE TABLE operations (
    operationid bigserial PRIMARY KEY,
    actionid bigint NOT NULL REFERENCES actions ON DELETE CASCADE,
    operationtype integer NOT NULL DEFAULT 0,
    recovery integer NOT NULL DEFAULT 0,
    esc_period text NOT NULL DEFAULT '0',
    esc_step_from integer NOT NULL DEFAULT 1,
    esc_step_to integer NOT NULL DEFAULT 1,
    evaltype integer NOT NULL DEFAULT 0
);

CREATE TABLE opconditions (
    opconditionid bigserial PRIMARY KEY,
    operationid bigint NOT NULL REFERENCES operations ON DELETE CASCADE,
    conditiontype integer NOT NULL DEFAULT 14,
    operator integer NOT NULL DEFAULT 0,
    value text NOT NULL DEFAULT ''
);

CREATE TABLE opmessage (
    opmessageid bigserial PRIMARY KEY,
    operationid bigint NOT NULL UNIQUE REFERENCES operations ON DELETE CASCADE,
    default_msg integer NOT NULL DEFAULT 1,
    subject varchar(255) NOT NULL DEFAULT '',
    message text NOT NULL DEFAULT '',
    mediatypeid bigint
);

CREATE TABLE opcommand (
    opcommandid bigserial PRIMARY KEY,
    operationid bigint NOT NULL UNIQUE REFERENCES operations ON DELETE CASCADE,
    scriptid bigint NOT NULL,
    execute_on integer NOT NULL DEFAULT 0
);

CREATE TABLE opcommand_hst (
    opcommand_hstid bigserial PRIMARY KEY,
    operationid bigint NOT NULL REFERENCES operations ON DELETE CASCADE,
    hostid bigint
);

CREATE TABLE opcommand_grp (
    opcommand_grpid bigserial PRIMARY KEY,
    operationid bigint NOT NULL REFERENCES operations ON DELETE CASCADE,
    groupid bigint NOT NULL
);

CREATE TABLE opgroup (
    opgroupid bigserial PRIMARY KEY,
    operationid bigint NOT NULL REFERENCES operations ON DELETE CASCADE,
    groupid bigint NOT NULL
);

CREATE TABLE optemplate (
    optemplateid bigserial PRIMARY KEY,
    operationid bigint NOT NULL REFERENCES operations ON DELETE CASCADE,
    templateid bigint NOT NULL
);

CREATE TABLE opinventory (
    opinventoryid bigserial PRIMARY KEY,
    operationid bigint NOT NULL UNIQUE REFERENCES operations ON DELETE CASCADE,
    inventory_mode integer NOT NULL DEFAULT 0
);

CREATE TABLE opmessage_grp (
    opmessage_grpid bigserial PRIMARY KEY,
    operationid bigint NOT NULL REFERENCES operations ON DELETE CASCADE,
    usrgrpid bigint NOT NULL
);

CREATE TABLE opmessage_usr (
    opmessage_usrid bigserial PRIMARY KEY,
    operationid bigint NOT NULL REFERENCES operations ON DELETE CASCADE,
    userid bigint NOT NULL
);

CREATE TABLE optag (
    optagid bigserial PRIMARY KEY,
    operationid bigint NOT NULL REFERENCES operations ON DELETE CASCADE,
    tag varchar(255) NOT NULL DEFAULT '',
    value varchar(255) NOT NULL DEFAULT ''
);

CREATE TABLE items (
    itemid bigserial PRIMARY KEY,
    hostid bigint NOT NULL REFERENCES hosts ON DELETE CASCADE,
    name text NOT NULL DEFAULT '',
    evaltype integer NOT NULL DEFAULT 0,
    formula text NOT NULL DEFAULT ''
);

CREATE TABLE item_condition (
    item_conditionid bigserial PRIMARY KEY,
    itemid bigint NOT NULL REFERENCES items ON DELETE CASCADE,
    conditiontype integer NOT NULL DEFAULT 0,
    operator integer NOT NULL DEFAULT 8,
    value text NOT NULL DEFAULT '',
    value2 text NOT NULL DEFAULT ''
);

CREATE TABLE lld_macro_path (
    lld_macro_pathid bigserial PRIMARY KEY,
    itemid bigint NOT NULL REFERENCES items ON DELETE CASCADE,
    lld_macro varchar(255) NOT NULL,
    path text NOT NULL DEFAULT '',
    UNIQUE (itemid, lld_macro)
);

CREATE TABLE lld_override (
    lld_overrideid bigserial PRIMARY KEY,
    itemid bigint NOT NULL REFERENCES items ON DELETE CASCADE,
    name varchar(255) NOT NULL,
    step integer NOT NULL,
    stop integer NOT NULL DEFAULT 0,
    evaltype integer NOT NULL DEFAULT 0,
    formula text NOT NULL DEFAULT '',
    UNIQUE (itemid, name),
    UNIQUE (itemid, step)
);

CREATE TABLE lld_override_condition (
    lld_override_conditionid bigserial PRIMARY KEY,
    lld_overrideid bigint NOT NULL REFERENCES lld_override ON DELETE CASCADE,
    conditiontype integer NOT NULL DEFAULT 0,
    operator integer NOT NULL DEFAULT 8,
    value text NOT NULL DEFAULT '',
    value2 text NOT NULL DEFAULT ''
);

CREATE TABLE lld_override_operation (
    lld_override_operationid bigserial PRIMARY KEY,
    lld_overrideid bigint NOT NULL REFERENCES lld_override ON DELETE CASCADE,
    operationobject integer NOT NULL DEFAULT 0,
    operator integer NOT NULL DEFAULT 0,
    value text NOT NULL DEFAULT ''
);

CREATE TABLE lld_override_optag (
    lld_override_optagid bigserial PRIMARY KEY,
    lld_override_operationid bigint NOT NULL REFERENCES lld_override_operation ON DELETE CASCADE,
    tag varchar(255) NOT NULL DEFAULT '',
    value varchar(255) NOT NULL DEFAULT ''
);

CREATE TABLE lld_override_optemplate (
    lld_override_optemplateid bigserial PRIMARY KEY,
    lld_override_operationid bigint NOT NULL REFERENCES lld_override_operation ON DELETE CASCADE,
    templateid bigint NOT NULL
);

CREATE TABLE host_tag (
    hosttagid bigserial PRIMARY KEY,
    hostid bigint NOT NULL REFERENCES hosts ON DELETE CASCADE,
    tag varchar(255) NOT NULL DEFAULT '',
    value varchar(255) NOT NULL DEFAULT '',
    automatic integer NOT NULL DEFAULT 0
);

CREATE TABLE hostmacro (
    hostmacroid bigserial PRIMARY KEY,
    hostid bigint NOT NULL REFERENCES hosts ON DELETE CASCADE,
    macro varchar(255) NOT NULL,
    value text NOT NULL DEFAULT '',
    description text NOT NULL DEFAULT '',
    type integer NOT NULL DEFAULT 0,
    UNIQUE (hostid, macro)
);

CREATE TABLE hosts_groups (
    hostgroupid bigserial PRIMARY KEY,
    hostid bigint NOT NULL REFERENCES hosts ON DELETE CASCADE,
    groupid bigint NOT NULL,
    UNIQUE (hostid, groupid)
);

CREATE TABLE hosts_templates (
    hosttemplateid bigserial PRIMARY KEY,
    hostid bigint NOT NULL REFERENCES hosts ON DELETE CASCADE,
    templateid bigint NOT NULL,
    UNIQUE (hostid, templateid)
);
";

/// Create every reconciled table in the connected database.
///
/// # Errors
///
/// Returns an error when any statement fails, for example because the tables
/// already exist.
pub fn apply_schema(client: &mut Client) -> Result<()> {
    client
        .batch_execute(SCHEMA)
        .context("failed to apply rowsync test schema")
}
