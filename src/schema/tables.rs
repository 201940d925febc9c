//! Table layouts and their named uniqueness constraints.

use super::types::ColumnType::*;
use super::types::*;

pub const EXPERIMENTS: TableSchema = TableSchema {
    name: "experiments",
    columns: &[
        required(ID, Serial),
        required("name", Text),
        required("cycle_start", Timestamp),
        required("cycle_stop", Timestamp),
        required("owner_id", Text),
        nullable("group_id", Text),
        nullable("experiment_type", Text),
        required("platform", Text),
        required("wallclock_start", Timestamp),
        nullable("wallclock_end", Timestamp),
        nullable("description", Json),
        nullable(CREATED_AT, Timestamp),
        nullable(UPDATED_AT, Timestamp),
    ],
    unique: Some(UniqueConstraint {
        name: "unique_experiment",
        columns: &["name", "wallclock_start"],
    }),
    foreign_keys: &[],
};

pub const REGIONS: TableSchema = TableSchema {
    name: "regions",
    columns: &[
        required(ID, Serial),
        required("name", Text),
        required("min_lat", Float),
        required("max_lat", Float),
        required("east_lon", Float),
        required("west_lon", Float),
        nullable(CREATED_AT, Timestamp),
        nullable(UPDATED_AT, Timestamp),
    ],
    unique: Some(UniqueConstraint {
        name: "unique_region",
        columns: &["min_lat", "max_lat", "east_lon", "west_lon"],
    }),
    foreign_keys: &[],
};

pub const METRIC_TYPES: TableSchema = TableSchema {
    name: "metric_types",
    columns: &[
        required(ID, Serial),
        required("name", Text),
        nullable("long_name", Text),
        required("measurement_type", Text),
        nullable("measurement_units", Text),
        nullable("stat_type", Text),
        nullable("description", Json),
        nullable(CREATED_AT, Timestamp),
        nullable(UPDATED_AT, Timestamp),
    ],
    unique: Some(UniqueConstraint {
        name: "unique_metric_type",
        columns: &["name", "measurement_type", "measurement_units", "stat_type"],
    }),
    foreign_keys: &[],
};

pub const INSTRUMENT_META: TableSchema = TableSchema {
    name: "instrument_meta",
    columns: &[
        required(ID, Serial),
        required("name", Text),
        nullable("num_channels", Int),
        nullable("scan_angle", Text),
        nullable(CREATED_AT, Timestamp),
        nullable(UPDATED_AT, Timestamp),
    ],
    unique: Some(UniqueConstraint {
        name: "unique_instrument_meta",
        columns: &["name"],
    }),
    foreign_keys: &[],
};

pub const ARRAY_METRIC_TYPES: TableSchema = TableSchema {
    name: "array_metric_types",
    columns: &[
        required(ID, Serial),
        required("name", Text),
        nullable("long_name", Text),
        nullable("obs_platform", Text),
        nullable("instrument_meta_id", Int),
        required("measurement_type", Text),
        nullable("measurement_units", Text),
        nullable("stat_type", Text),
        nullable("array_coord_labels", TextArray),
        nullable("array_coord_units", TextArray),
        nullable("array_index_values", TextArray),
        nullable("array_dimensions", TextArray),
        nullable("description", Json),
        nullable(CREATED_AT, Timestamp),
        nullable(UPDATED_AT, Timestamp),
    ],
    unique: Some(UniqueConstraint {
        name: "unique_array_metric_type",
        columns: &[
            "name",
            "measurement_type",
            "measurement_units",
            "stat_type",
            "obs_platform",
            "instrument_meta_id",
        ],
    }),
    foreign_keys: &[ForeignKey {
        column: "instrument_meta_id",
        table: "instrument_meta",
    }],
};

pub const SAT_META: TableSchema = TableSchema {
    name: "sat_meta",
    columns: &[
        required(ID, Serial),
        nullable("name", Text),
        nullable("sat_id", Int),
        nullable("sat_name", Text),
        nullable("short_name", Text),
        nullable(CREATED_AT, Timestamp),
        nullable(UPDATED_AT, Timestamp),
    ],
    unique: Some(UniqueConstraint {
        name: "unique_sat_meta",
        columns: &["sat_name", "sat_id", "short_name"],
    }),
    foreign_keys: &[],
};

pub const FILE_TYPES: TableSchema = TableSchema {
    name: "file_types",
    columns: &[
        required(ID, Serial),
        required("name", Text),
        required("file_template", Text),
        nullable("file_format", Text),
        nullable("description", Json),
        nullable(CREATED_AT, Timestamp),
        nullable(UPDATED_AT, Timestamp),
    ],
    unique: Some(UniqueConstraint {
        name: "unique_file_type",
        columns: &["name"],
    }),
    foreign_keys: &[],
};

pub const STORAGE_LOCATIONS: TableSchema = TableSchema {
    name: "storage_locations",
    columns: &[
        required(ID, Serial),
        required("name", Text),
        nullable("platform", Text),
        required("bucket_name", Text),
        nullable("key", Text),
        nullable("platform_region", Text),
        nullable(CREATED_AT, Timestamp),
        nullable(UPDATED_AT, Timestamp),
    ],
    unique: Some(UniqueConstraint {
        name: "unique_storage_location",
        columns: &["name", "platform", "bucket_name", "key"],
    }),
    foreign_keys: &[],
};

pub const EXPT_METRICS: TableSchema = TableSchema {
    name: "expt_metrics",
    columns: &[
        required(ID, Serial),
        required("experiment_id", Int),
        required("metric_type_id", Int),
        required("region_id", Int),
        nullable("elevation", Float),
        nullable("elevation_unit", Text),
        nullable("value", Float),
        required("time_valid", Timestamp),
        nullable("forecast_hour", Float),
        nullable("ensemble_member", Int),
        nullable(CREATED_AT, Timestamp),
    ],
    unique: None,
    foreign_keys: &[
        ForeignKey { column: "experiment_id", table: "experiments" },
        ForeignKey { column: "metric_type_id", table: "metric_types" },
        ForeignKey { column: "region_id", table: "regions" },
    ],
};

pub const EXPT_ARRAY_METRICS: TableSchema = TableSchema {
    name: "expt_array_metrics",
    columns: &[
        required(ID, Serial),
        required("experiment_id", Int),
        required("array_metric_type_id", Int),
        required("region_id", Int),
        nullable("sat_meta_id", Int),
        nullable("value", FloatArray),
        nullable("assimilated", Bool),
        required("time_valid", Timestamp),
        nullable("forecast_hour", Float),
        nullable("ensemble_member", Int),
        nullable(CREATED_AT, Timestamp),
    ],
    unique: None,
    foreign_keys: &[
        ForeignKey { column: "experiment_id", table: "experiments" },
        ForeignKey { column: "array_metric_type_id", table: "array_metric_types" },
        ForeignKey { column: "region_id", table: "regions" },
        ForeignKey { column: "sat_meta_id", table: "sat_meta" },
    ],
};

pub const EXPT_STORED_FILE_COUNTS: TableSchema = TableSchema {
    name: "expt_stored_file_counts",
    columns: &[
        required(ID, Serial),
        required("experiment_id", Int),
        required("file_type_id", Int),
        required("storage_location_id", Int),
        required("count", Float),
        nullable("folder_path", Text),
        nullable("cycle", Timestamp),
        nullable("time_valid", Timestamp),
        nullable("forecast_hour", Float),
        nullable("file_size_bytes", BigInt),
        nullable(CREATED_AT, Timestamp),
    ],
    unique: None,
    foreign_keys: &[
        ForeignKey { column: "experiment_id", table: "experiments" },
        ForeignKey { column: "file_type_id", table: "file_types" },
        ForeignKey { column: "storage_location_id", table: "storage_locations" },
    ],
};

/// Creation order; referenced tables come first.
pub const ALL_TABLES: &[&TableSchema] = &[
    &EXPERIMENTS,
    &REGIONS,
    &METRIC_TYPES,
    &INSTRUMENT_META,
    &ARRAY_METRIC_TYPES,
    &SAT_META,
    &FILE_TYPES,
    &STORAGE_LOCATIONS,
    &EXPT_METRICS,
    &EXPT_ARRAY_METRICS,
    &EXPT_STORED_FILE_COUNTS,
];
