//! Entity descriptors: joins, projections, filters, PUT rules, references and dedup keys.

use super::tables;
use super::types::ColumnType as C;
use super::types::FilterKind::{Bool, Number, Text, Time};
use super::types::*;

/// Platforms an experiment may run on.
pub const VALID_PLATFORMS: &[&str] = &["hera", "orion", "pw_azv1", "pw_azv2", "pw_awv1", "pw_awv2"];

const NEWEST_FIRST: &[(&str, bool)] = &[("created_at", true), ("id", true)];
const LATEST_WALLCLOCK_FIRST: &[(&str, bool)] = &[("wallclock_start", true), ("id", true)];

const EXPERIMENT_FIELDS: &[FilterField] = &[
    field(&["name", "experiment_name"], "e", "name", Text),
    field(&["cycle_start"], "e", "cycle_start", Time),
    field(&["cycle_stop"], "e", "cycle_stop", Time),
    field(&["owner_id"], "e", "owner_id", Text),
    field(&["group_id"], "e", "group_id", Text),
    field(&["experiment_type"], "e", "experiment_type", Text),
    field(&["platform"], "e", "platform", Text),
    field(&["wallclock_start"], "e", "wallclock_start", Time),
    field(&["wallclock_end"], "e", "wallclock_end", Time),
];

const REGION_FIELDS: &[FilterField] = &[
    field(&["name", "region_name"], "rg", "name", Text),
    field(&["min_lat"], "rg", "min_lat", Number),
    field(&["max_lat"], "rg", "max_lat", Number),
    field(&["east_lon"], "rg", "east_lon", Number),
    field(&["west_lon"], "rg", "west_lon", Number),
];

const METRIC_TYPE_FIELDS: &[FilterField] = &[
    field(&["name", "metric_name"], "mt", "name", Text),
    field(&["long_name"], "mt", "long_name", Text),
    field(&["measurement_type"], "mt", "measurement_type", Text),
    field(&["measurement_units"], "mt", "measurement_units", Text),
    field(&["stat_type"], "mt", "stat_type", Text),
];

const ARRAY_METRIC_TYPE_FIELDS: &[FilterField] = &[
    field(&["name", "metric_name"], "amt", "name", Text),
    field(&["long_name"], "amt", "long_name", Text),
    field(&["obs_platform"], "amt", "obs_platform", Text),
    field(&["measurement_type"], "amt", "measurement_type", Text),
    field(&["measurement_units"], "amt", "measurement_units", Text),
    field(&["stat_type"], "amt", "stat_type", Text),
    field(&["instrument_meta_name", "instrument_name"], "im", "name", Text),
];

const INSTRUMENT_META_FIELDS: &[FilterField] = &[
    field(&["name", "instrument_meta_name"], "im", "name", Text),
    field(&["num_channels"], "im", "num_channels", Number),
    field(&["scan_angle"], "im", "scan_angle", Text),
];

const SAT_META_FIELDS: &[FilterField] = &[
    field(&["name", "sat_meta_name"], "sm", "name", Text),
    field(&["sat_id"], "sm", "sat_id", Number),
    field(&["sat_name"], "sm", "sat_name", Text),
    field(&["short_name", "sat_short_name"], "sm", "short_name", Text),
];

const FILE_TYPE_FIELDS: &[FilterField] = &[
    field(&["name", "file_type_name"], "ft", "name", Text),
    field(&["file_template"], "ft", "file_template", Text),
    field(&["file_format"], "ft", "file_format", Text),
];

const STORAGE_LOCATION_FIELDS: &[FilterField] = &[
    field(&["name", "storage_location_name"], "sl", "name", Text),
    field(&["platform"], "sl", "platform", Text),
    field(&["bucket_name"], "sl", "bucket_name", Text),
    field(&["key"], "sl", "key", Text),
    field(&["platform_region"], "sl", "platform_region", Text),
];

pub const EXPERIMENT: EntitySchema = EntitySchema {
    request_name: "experiment",
    aliases: &["experiments"],
    label: "experiment",
    table: &tables::EXPERIMENTS,
    alias: "e",
    joins: &[],
    projection: &[],
    filters: &[FilterBlock { key: None, fields: EXPERIMENT_FIELDS }],
    rules: &[
        ValidationRule::required("name"),
        ValidationRule::required("cycle_start"),
        ValidationRule::required("cycle_stop"),
        ValidationRule::required("owner_id"),
        ValidationRule::required("platform").allowed(VALID_PLATFORMS),
        ValidationRule::required("wallclock_start"),
    ],
    ordered_pairs: &[("cycle_start", "cycle_stop")],
    references: &[],
    kind: EntityKind::Taxonomy,
};

pub const REGION: EntitySchema = EntitySchema {
    request_name: "region",
    aliases: &["regions"],
    label: "region",
    table: &tables::REGIONS,
    alias: "rg",
    joins: &[],
    projection: &[],
    filters: &[FilterBlock { key: None, fields: REGION_FIELDS }],
    rules: &[
        ValidationRule::required("name"),
        ValidationRule::required("min_lat").range(-90.0, 90.0),
        ValidationRule::required("max_lat").range(-90.0, 90.0),
        ValidationRule::required("east_lon").range(0.0, 360.0),
        ValidationRule::required("west_lon").range(0.0, 360.0),
    ],
    ordered_pairs: &[("min_lat", "max_lat")],
    references: &[],
    kind: EntityKind::Taxonomy,
};

pub const METRIC_TYPE: EntitySchema = EntitySchema {
    request_name: "metric_types",
    aliases: &["metric_type"],
    label: "metric type",
    table: &tables::METRIC_TYPES,
    alias: "mt",
    joins: &[],
    projection: &[],
    filters: &[FilterBlock { key: None, fields: METRIC_TYPE_FIELDS }],
    rules: &[
        ValidationRule::required("name"),
        ValidationRule::required("measurement_type"),
    ],
    ordered_pairs: &[],
    references: &[],
    kind: EntityKind::Taxonomy,
};

pub const INSTRUMENT_META: EntitySchema = EntitySchema {
    request_name: "instrument_meta",
    aliases: &[],
    label: "instrument meta",
    table: &tables::INSTRUMENT_META,
    alias: "im",
    joins: &[],
    projection: &[],
    filters: &[FilterBlock { key: None, fields: INSTRUMENT_META_FIELDS }],
    rules: &[ValidationRule::required("name")],
    ordered_pairs: &[],
    references: &[],
    kind: EntityKind::Taxonomy,
};

pub const ARRAY_METRIC_TYPE: EntitySchema = EntitySchema {
    request_name: "array_metric_types",
    aliases: &["array_metric_type"],
    label: "array metric type",
    table: &tables::ARRAY_METRIC_TYPES,
    alias: "amt",
    joins: &[Join {
        kind: JoinKind::Left,
        table: "instrument_meta",
        alias: "im",
        from_alias: "amt",
        from_column: "instrument_meta_id",
    }],
    projection: &[
        proj("amt", "id", "id", C::Serial),
        proj("amt", "name", "name", C::Text),
        proj("amt", "long_name", "long_name", C::Text),
        proj("amt", "obs_platform", "obs_platform", C::Text),
        proj("amt", "measurement_type", "measurement_type", C::Text),
        proj("amt", "measurement_units", "measurement_units", C::Text),
        proj("amt", "stat_type", "stat_type", C::Text),
        proj("amt", "array_coord_labels", "array_coord_labels", C::TextArray),
        proj("amt", "array_coord_units", "array_coord_units", C::TextArray),
        proj("amt", "array_index_values", "array_index_values", C::TextArray),
        proj("amt", "array_dimensions", "array_dimensions", C::TextArray),
        proj("amt", "description", "description", C::Json),
        proj("amt", "instrument_meta_id", "instrument_meta_id", C::Int),
        proj("im", "name", "instrument_name", C::Text),
        proj("im", "num_channels", "instrument_num_channels", C::Int),
        proj("im", "scan_angle", "instrument_scan_angle", C::Text),
        proj("amt", "created_at", "created_at", C::Timestamp),
        proj("amt", "updated_at", "updated_at", C::Timestamp),
    ],
    filters: &[FilterBlock { key: None, fields: ARRAY_METRIC_TYPE_FIELDS }],
    rules: &[
        ValidationRule::required("name"),
        ValidationRule::required("measurement_type"),
    ],
    ordered_pairs: &[],
    references: &[Reference {
        column: "instrument_meta_id",
        target: "instrument_meta",
        keys: &[KeyBinding { input: "instrument_meta_name", filter: "name", kind: Text }],
        scope: RefScope::Body,
        optional: true,
        tie_break: NEWEST_FIRST,
    }],
    kind: EntityKind::Taxonomy,
};

pub const SAT_META: EntitySchema = EntitySchema {
    request_name: "sat_meta",
    aliases: &[],
    label: "sat meta",
    table: &tables::SAT_META,
    alias: "sm",
    joins: &[],
    projection: &[],
    filters: &[FilterBlock { key: None, fields: SAT_META_FIELDS }],
    rules: &[],
    ordered_pairs: &[],
    references: &[],
    kind: EntityKind::Taxonomy,
};

pub const FILE_TYPE: EntitySchema = EntitySchema {
    request_name: "file_types",
    aliases: &["file_type"],
    label: "file type",
    table: &tables::FILE_TYPES,
    alias: "ft",
    joins: &[],
    projection: &[],
    filters: &[FilterBlock { key: None, fields: FILE_TYPE_FIELDS }],
    rules: &[
        ValidationRule::required("name"),
        ValidationRule::required("file_template"),
    ],
    ordered_pairs: &[],
    references: &[],
    kind: EntityKind::Taxonomy,
};

pub const STORAGE_LOCATION: EntitySchema = EntitySchema {
    request_name: "storage_locations",
    aliases: &["storage_location"],
    label: "storage location",
    table: &tables::STORAGE_LOCATIONS,
    alias: "sl",
    joins: &[],
    projection: &[],
    filters: &[FilterBlock { key: None, fields: STORAGE_LOCATION_FIELDS }],
    rules: &[
        ValidationRule::required("name"),
        ValidationRule::required("bucket_name"),
    ],
    ordered_pairs: &[],
    references: &[],
    kind: EntityKind::Taxonomy,
};

const EXPERIMENT_REFERENCE: Reference = Reference {
    column: "experiment_id",
    target: "experiment",
    keys: &[
        KeyBinding { input: "expt_name", filter: "name", kind: Text },
        KeyBinding { input: "expt_wallclock_start", filter: "wallclock_start", kind: Time },
    ],
    scope: RefScope::Body,
    optional: false,
    tie_break: LATEST_WALLCLOCK_FIRST,
};

const REGION_REFERENCE: Reference = Reference {
    column: "region_id",
    target: "region",
    keys: &[KeyBinding { input: "region_name", filter: "name", kind: Text }],
    scope: RefScope::Row,
    optional: false,
    tie_break: NEWEST_FIRST,
};

pub const EXPT_METRIC: EntitySchema = EntitySchema {
    request_name: "expt_metrics",
    aliases: &[],
    label: "expt metric",
    table: &tables::EXPT_METRICS,
    alias: "em",
    joins: &[
        Join { kind: JoinKind::Inner, table: "experiments", alias: "e", from_alias: "em", from_column: "experiment_id" },
        Join { kind: JoinKind::Inner, table: "metric_types", alias: "mt", from_alias: "em", from_column: "metric_type_id" },
        Join { kind: JoinKind::Inner, table: "regions", alias: "rg", from_alias: "em", from_column: "region_id" },
    ],
    projection: &[
        proj("em", "id", "id", C::Serial),
        proj("mt", "name", "name", C::Text),
        proj("em", "elevation", "elevation", C::Float),
        proj("em", "elevation_unit", "elevation_unit", C::Text),
        proj("em", "value", "value", C::Float),
        proj("em", "time_valid", "time_valid", C::Timestamp),
        proj("em", "forecast_hour", "forecast_hour", C::Float),
        proj("em", "ensemble_member", "ensemble_member", C::Int),
        proj("e", "id", "expt_id", C::Serial),
        proj("e", "name", "expt_name", C::Text),
        proj("e", "wallclock_start", "wallclock_start", C::Timestamp),
        proj("mt", "id", "metric_id", C::Serial),
        proj("mt", "long_name", "metric_long_name", C::Text),
        proj("mt", "measurement_type", "metric_type", C::Text),
        proj("mt", "measurement_units", "metric_unit", C::Text),
        proj("mt", "stat_type", "metric_stat_type", C::Text),
        proj("rg", "id", "region_id", C::Serial),
        proj("rg", "name", "region", C::Text),
        proj("em", "created_at", "created_at", C::Timestamp),
    ],
    filters: &[
        FilterBlock { key: Some("experiment"), fields: EXPERIMENT_FIELDS },
        FilterBlock { key: Some("metric_types"), fields: METRIC_TYPE_FIELDS },
        FilterBlock { key: Some("regions"), fields: REGION_FIELDS },
        FilterBlock {
            key: None,
            fields: &[
                field(&["time_valid"], "em", "time_valid", Time),
                field(&["forecast_hour"], "em", "forecast_hour", Number),
                field(&["ensemble_member"], "em", "ensemble_member", Number),
                field(&["elevation"], "em", "elevation", Number),
                field(&["elevation_unit"], "em", "elevation_unit", Text),
            ],
        },
    ],
    rules: &[
        ValidationRule::required("name"),
        ValidationRule::required("region_name"),
        ValidationRule::required("time_valid"),
    ],
    ordered_pairs: &[],
    references: &[
        EXPERIMENT_REFERENCE,
        Reference {
            column: "metric_type_id",
            target: "metric_types",
            keys: &[KeyBinding { input: "name", filter: "name", kind: Text }],
            scope: RefScope::Row,
            optional: false,
            tie_break: NEWEST_FIRST,
        },
        REGION_REFERENCE,
    ],
    kind: EntityKind::Fact {
        rows_key: Some("metrics"),
        dedup_key: Some(&[
            "name",
            "elevation",
            "elevation_unit",
            "time_valid",
            "forecast_hour",
            "ensemble_member",
            "expt_id",
            "metric_id",
            "region_id",
        ]),
    },
};

pub const EXPT_ARRAY_METRIC: EntitySchema = EntitySchema {
    request_name: "expt_array_metrics",
    aliases: &[],
    label: "expt array metric",
    table: &tables::EXPT_ARRAY_METRICS,
    alias: "eam",
    joins: &[
        Join { kind: JoinKind::Inner, table: "experiments", alias: "e", from_alias: "eam", from_column: "experiment_id" },
        Join { kind: JoinKind::Inner, table: "array_metric_types", alias: "amt", from_alias: "eam", from_column: "array_metric_type_id" },
        Join { kind: JoinKind::Inner, table: "regions", alias: "rg", from_alias: "eam", from_column: "region_id" },
        Join { kind: JoinKind::Left, table: "sat_meta", alias: "sm", from_alias: "eam", from_column: "sat_meta_id" },
        Join { kind: JoinKind::Left, table: "instrument_meta", alias: "im", from_alias: "amt", from_column: "instrument_meta_id" },
    ],
    projection: &[
        proj("eam", "id", "id", C::Serial),
        proj("amt", "name", "name", C::Text),
        proj("eam", "value", "value", C::FloatArray),
        proj("eam", "assimilated", "assimilated", C::Bool),
        proj("eam", "time_valid", "time_valid", C::Timestamp),
        proj("eam", "forecast_hour", "forecast_hour", C::Float),
        proj("eam", "ensemble_member", "ensemble_member", C::Int),
        proj("e", "id", "expt_id", C::Serial),
        proj("e", "name", "expt_name", C::Text),
        proj("e", "wallclock_start", "wallclock_start", C::Timestamp),
        proj("amt", "id", "metric_id", C::Serial),
        proj("amt", "long_name", "metric_long_name", C::Text),
        proj("amt", "measurement_type", "metric_type", C::Text),
        proj("amt", "measurement_units", "metric_unit", C::Text),
        proj("amt", "stat_type", "metric_stat_type", C::Text),
        proj("amt", "obs_platform", "metric_obs_platform", C::Text),
        proj("amt", "instrument_meta_id", "metric_instrument_meta_id", C::Int),
        proj("im", "name", "metric_instrument_name", C::Text),
        proj("amt", "array_coord_labels", "array_coord_labels", C::TextArray),
        proj("amt", "array_coord_units", "array_coord_units", C::TextArray),
        proj("amt", "array_index_values", "array_index_values", C::TextArray),
        proj("amt", "array_dimensions", "array_dimensions", C::TextArray),
        proj("rg", "id", "region_id", C::Serial),
        proj("rg", "name", "region", C::Text),
        proj("sm", "id", "sat_meta_id", C::Serial),
        proj("sm", "name", "sat_meta_name", C::Text),
        proj("sm", "sat_id", "sat_id", C::Int),
        proj("sm", "sat_name", "sat_name", C::Text),
        proj("sm", "short_name", "sat_short_name", C::Text),
        proj("eam", "created_at", "created_at", C::Timestamp),
    ],
    filters: &[
        FilterBlock { key: Some("experiment"), fields: EXPERIMENT_FIELDS },
        FilterBlock { key: Some("array_metric_types"), fields: ARRAY_METRIC_TYPE_FIELDS },
        FilterBlock { key: Some("regions"), fields: REGION_FIELDS },
        FilterBlock { key: Some("sat_meta"), fields: SAT_META_FIELDS },
        FilterBlock {
            key: None,
            fields: &[
                field(&["time_valid"], "eam", "time_valid", Time),
                field(&["forecast_hour"], "eam", "forecast_hour", Number),
                field(&["ensemble_member"], "eam", "ensemble_member", Number),
                field(&["assimilated"], "eam", "assimilated", Bool),
            ],
        },
    ],
    rules: &[
        ValidationRule::required("name"),
        ValidationRule::required("region_name"),
        ValidationRule::required("time_valid"),
    ],
    ordered_pairs: &[],
    references: &[
        EXPERIMENT_REFERENCE,
        Reference {
            column: "array_metric_type_id",
            target: "array_metric_types",
            keys: &[KeyBinding { input: "name", filter: "name", kind: Text }],
            scope: RefScope::Row,
            optional: false,
            tie_break: NEWEST_FIRST,
        },
        REGION_REFERENCE,
        Reference {
            column: "sat_meta_id",
            target: "sat_meta",
            keys: &[
                KeyBinding { input: "sat_meta_name", filter: "name", kind: Text },
                KeyBinding { input: "sat_id", filter: "sat_id", kind: Number },
                KeyBinding { input: "sat_name", filter: "sat_name", kind: Text },
                KeyBinding { input: "sat_short_name", filter: "short_name", kind: Text },
            ],
            scope: RefScope::Row,
            optional: true,
            tie_break: NEWEST_FIRST,
        },
    ],
    kind: EntityKind::Fact {
        rows_key: Some("array_metrics"),
        dedup_key: Some(&[
            "name",
            "time_valid",
            "forecast_hour",
            "ensemble_member",
            "expt_id",
            "metric_id",
            "region_id",
        ]),
    },
};

pub const EXPT_FILE_COUNT: EntitySchema = EntitySchema {
    request_name: "expt_file_counts",
    aliases: &[],
    label: "expt file count",
    table: &tables::EXPT_STORED_FILE_COUNTS,
    alias: "fc",
    joins: &[
        Join { kind: JoinKind::Inner, table: "experiments", alias: "e", from_alias: "fc", from_column: "experiment_id" },
        Join { kind: JoinKind::Inner, table: "file_types", alias: "ft", from_alias: "fc", from_column: "file_type_id" },
        Join { kind: JoinKind::Inner, table: "storage_locations", alias: "sl", from_alias: "fc", from_column: "storage_location_id" },
    ],
    projection: &[
        proj("fc", "id", "id", C::Serial),
        proj("fc", "count", "count", C::Float),
        proj("fc", "folder_path", "folder_path", C::Text),
        proj("fc", "cycle", "cycle", C::Timestamp),
        proj("fc", "time_valid", "time_valid", C::Timestamp),
        proj("fc", "forecast_hour", "forecast_hour", C::Float),
        proj("fc", "file_size_bytes", "file_size_bytes", C::BigInt),
        proj("e", "id", "experiment_id", C::Serial),
        proj("e", "name", "experiment_name", C::Text),
        proj("e", "wallclock_start", "wallclock_start", C::Timestamp),
        proj("ft", "id", "file_type_id", C::Serial),
        proj("ft", "name", "file_type_name", C::Text),
        proj("sl", "id", "storage_location_id", C::Serial),
        proj("sl", "name", "storage_location_name", C::Text),
        proj("fc", "created_at", "created_at", C::Timestamp),
    ],
    filters: &[
        FilterBlock { key: Some("experiment"), fields: EXPERIMENT_FIELDS },
        FilterBlock { key: Some("file_types"), fields: FILE_TYPE_FIELDS },
        FilterBlock { key: Some("storage_locations"), fields: STORAGE_LOCATION_FIELDS },
        FilterBlock {
            key: None,
            fields: &[
                field(&["count"], "fc", "count", Number),
                field(&["folder_path"], "fc", "folder_path", Text),
                field(&["cycle"], "fc", "cycle", Time),
                field(&["time_valid"], "fc", "time_valid", Time),
                field(&["forecast_hour"], "fc", "forecast_hour", Number),
                field(&["file_size_bytes"], "fc", "file_size_bytes", Number),
            ],
        },
    ],
    rules: &[
        ValidationRule::required("count").nonzero(),
        ValidationRule::required("experiment_name"),
        ValidationRule::required("file_type_name"),
        ValidationRule::required("bucket_name"),
    ],
    ordered_pairs: &[],
    references: &[
        Reference {
            column: "experiment_id",
            target: "experiment",
            keys: &[
                KeyBinding { input: "experiment_name", filter: "name", kind: Text },
                KeyBinding { input: "wallclock_start", filter: "wallclock_start", kind: Time },
            ],
            scope: RefScope::Body,
            optional: false,
            tie_break: LATEST_WALLCLOCK_FIRST,
        },
        Reference {
            column: "file_type_id",
            target: "file_types",
            keys: &[KeyBinding { input: "file_type_name", filter: "name", kind: Text }],
            scope: RefScope::Body,
            optional: false,
            tie_break: NEWEST_FIRST,
        },
        Reference {
            column: "storage_location_id",
            target: "storage_locations",
            keys: &[
                KeyBinding { input: "bucket_name", filter: "bucket_name", kind: Text },
                KeyBinding { input: "platform", filter: "platform", kind: Text },
                KeyBinding { input: "key", filter: "key", kind: Text },
            ],
            scope: RefScope::Body,
            optional: false,
            tie_break: NEWEST_FIRST,
        },
    ],
    kind: EntityKind::Fact { rows_key: None, dedup_key: None },
};

/// Every entity reachable through the registry.
pub const ALL_ENTITIES: &[&EntitySchema] = &[
    &EXPERIMENT,
    &REGION,
    &METRIC_TYPE,
    &ARRAY_METRIC_TYPE,
    &INSTRUMENT_META,
    &SAT_META,
    &FILE_TYPE,
    &STORAGE_LOCATION,
    &EXPT_METRIC,
    &EXPT_ARRAY_METRIC,
    &EXPT_FILE_COUNT,
];

pub fn entity_by_name(name: &str) -> Option<&'static EntitySchema> {
    ALL_ENTITIES.iter().copied().find(|e| e.answers_to(name))
}
