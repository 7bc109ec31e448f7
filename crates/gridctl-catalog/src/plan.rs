//! Ordered catalog migration steps.
//!
//! Step `N` moves the catalog from version `N - 1` to `N`. Each step renders
//! its action list through the [`DialectAdapter`] it is given; the engine runs
//! the actions and the version bump in one transaction.

use std::collections::BTreeMap;

use crate::connection::SqlValue;
use crate::dialect::{ColumnType, DialectAdapter};

/// Lowest schema version a catalog can be migrated from.
pub const BASELINE_SCHEMA_VERSION: u32 = 1;

/// One side-effecting action inside a migration step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationAction {
    /// Runs a single statement.
    Execute {
        /// Statement text.
        statement: String,
        /// Bound parameters.
        params: Vec<SqlValue>,
    },
    /// Runs `select`, then `update` once per returned row with that row's
    /// columns bound as the update parameters, in order.
    Backfill {
        /// Query producing the parameter rows.
        select: String,
        /// Statement executed per row.
        update: String,
    },
    /// Runs a script shipped with the software through the vendor client.
    VendorScript {
        /// Script file name, relative to the runner's script directory.
        script: String,
    },
}

impl MigrationAction {
    /// Statement without parameters.
    pub fn statement(statement: impl Into<String>) -> Self {
        Self::Execute {
            statement: statement.into(),
            params: Vec::new(),
        }
    }

    /// Statement with bound parameters.
    pub fn bound(statement: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self::Execute {
            statement: statement.into(),
            params,
        }
    }
}

/// Builds the action list of a step for a dialect.
pub type ActionBuilder = fn(DialectAdapter) -> Vec<MigrationAction>;

/// A single version advance.
#[derive(Debug, Clone, Copy)]
pub struct MigrationStep {
    version: u32,
    description: &'static str,
    build: ActionBuilder,
}

impl MigrationStep {
    /// Declares the step that produces schema `version`.
    #[must_use]
    pub const fn new(version: u32, description: &'static str, build: ActionBuilder) -> Self {
        Self {
            version,
            description,
            build,
        }
    }

    /// Destination schema version.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Operator-facing summary.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        self.description
    }

    /// Renders the action list for `adapter`.
    #[must_use]
    pub fn actions(&self, adapter: DialectAdapter) -> Vec<MigrationAction> {
        (self.build)(adapter)
    }
}

/// Registry of migration steps keyed by destination version.
#[derive(Debug, Clone, Default)]
pub struct MigrationPlan {
    steps: BTreeMap<u32, MigrationStep>,
}

impl MigrationPlan {
    /// Builds a plan from arbitrary steps; later duplicates replace earlier ones.
    pub fn from_steps(steps: impl IntoIterator<Item = MigrationStep>) -> Self {
        Self {
            steps: steps
                .into_iter()
                .map(|step| (step.version(), step))
                .collect(),
        }
    }

    /// The steps shipped with this release of the catalog schema.
    #[must_use]
    pub fn catalog() -> Self {
        Self::from_steps(CATALOG_STEPS.iter().copied())
    }

    /// Looks up the step producing `version`.
    #[must_use]
    pub fn step(&self, version: u32) -> Option<&MigrationStep> {
        self.steps.get(&version)
    }

    /// Highest version this plan can reach.
    #[must_use]
    pub fn latest_version(&self) -> u32 {
        self.steps
            .keys()
            .next_back()
            .copied()
            .unwrap_or(BASELINE_SCHEMA_VERSION)
    }

    /// Steps that advance `current` to `target`, in order.
    ///
    /// Versions without a registered step are reported as `None` so callers can
    /// refuse the upgrade before touching the catalog.
    #[must_use]
    pub fn pending(&self, current: u32, target: u32) -> Vec<(u32, Option<&MigrationStep>)> {
        (current.saturating_add(1)..=target)
            .map(|version| (version, self.step(version)))
            .collect()
    }
}

const GRID_CONFIGURATION_INSERT: &str =
    "INSERT INTO grid_configuration (namespace, option_name, option_value) VALUES (?, ?, ?)";

const CATALOG_STEPS: &[MigrationStep] = &[
    MigrationStep::new(2, "record data object access times", access_time_column),
    MigrationStep::new(3, "normalise access permission tokens", permission_tokens),
    MigrationStep::new(4, "index collection membership and access lookups", lookup_indexes),
    MigrationStep::new(5, "add ticket group restrictions", ticket_groups),
    MigrationStep::new(6, "seed delay server leadership settings", delay_server_seed),
    MigrationStep::new(7, "reinstall vendor sequence functions", vendor_functions),
];

fn access_time_column(adapter: DialectAdapter) -> Vec<MigrationAction> {
    vec![
        MigrationAction::statement(adapter.add_column(
            "data_objects",
            "access_ts",
            ColumnType::VarChar(32),
        )),
        MigrationAction::Backfill {
            select: String::from(
                "SELECT modify_ts, data_id, data_repl_num FROM data_objects WHERE access_ts IS NULL",
            ),
            update: String::from(
                "UPDATE data_objects SET access_ts = ? WHERE data_id = ? AND data_repl_num = ?",
            ),
        },
    ]
}

fn permission_tokens(_adapter: DialectAdapter) -> Vec<MigrationAction> {
    const RENAMES: &[(&str, &str)] = &[
        ("read object", "read_object"),
        ("modify object", "modify_object"),
        ("delete object", "delete_object"),
        ("read metadata", "read_metadata"),
        ("modify metadata", "modify_metadata"),
    ];
    RENAMES
        .iter()
        .map(|(from, to)| {
            MigrationAction::bound(
                "UPDATE tokens SET token_name = ? WHERE token_namespace = 'access_type' AND token_name = ?",
                vec![SqlValue::text(*to), SqlValue::text(*from)],
            )
        })
        .collect()
}

fn lookup_indexes(adapter: DialectAdapter) -> Vec<MigrationAction> {
    vec![
        MigrationAction::statement(adapter.create_index(
            "idx_data_objects_coll",
            "data_objects",
            &["coll_id", "data_name"],
        )),
        MigrationAction::statement(adapter.create_index(
            "idx_object_access_user",
            "object_access",
            &["user_id"],
        )),
    ]
}

fn ticket_groups(adapter: DialectAdapter) -> Vec<MigrationAction> {
    vec![MigrationAction::statement(adapter.create_table(
        "ticket_allowed_groups",
        &[
            ("ticket_id", ColumnType::BigInt, false),
            ("group_name", ColumnType::VarChar(250), false),
        ],
    ))]
}

fn delay_server_seed(_adapter: DialectAdapter) -> Vec<MigrationAction> {
    ["leader", "successor"]
        .into_iter()
        .map(|option| {
            MigrationAction::bound(
                GRID_CONFIGURATION_INSERT,
                vec![
                    SqlValue::text("delay_server"),
                    SqlValue::text(option),
                    SqlValue::text(""),
                ],
            )
        })
        .collect()
}

fn vendor_functions(adapter: DialectAdapter) -> Vec<MigrationAction> {
    match adapter.dialect() {
        gridctl_config::Dialect::MySql => vec![MigrationAction::VendorScript {
            script: String::from("mysql_functions.sql"),
        }],
        _ => Vec::new(),
    }
}
