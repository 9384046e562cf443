//! Handwritten Diesel schema declarations mirroring `migrations/`.

diesel::table! {
    daily_yields (site, day) {
        site -> Text,
        day -> Date,
        latitude -> Float8,
        longitude -> Float8,
        temp_max_c -> Float8,
        temp_min_c -> Float8,
        temp_mean_c -> Float8,
        humidity_mean_pct -> Float8,
        wind_max_kmh -> Float8,
        precip_sum_mm -> Float8,
        dewpoint_mean_c -> Float8,
        hours -> Int4,
        dew_yield -> Float8,
        fog_yield -> Float8,
        updated_at -> Timestamptz,
    }
}
