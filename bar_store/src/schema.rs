// Static part of the schema. Per-instrument tables are named at runtime and
// live in `schema_manager`.

diesel::table! {
    ticker (tick_name) {
        tick_name -> Text,
        tick_type -> Text,
    }
}
