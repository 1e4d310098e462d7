/// Display category for a WMO weather code, used to pick an icon and color.
pub fn condition(code: i32) -> &'static str {
    match code {
        0 => "sunny",
        1..=3 => "partly-cloudy",
        45..=48 => "fog",
        51..=67 => "rainy",
        71..=77 => "snowy",
        80..=82 => "pouring",
        95..=99 => "lightning",
        _ => "cloudy",
    }
}

pub fn summary_en(code: i32) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 | 48 => "Fog",
        51 | 53 | 55 | 56 | 57 => "Drizzle",
        61 | 63 | 65 | 66 | 67 => "Rain",
        71 | 73 | 75 | 77 => "Snow",
        80..=82 => "Rain showers",
        85 | 86 => "Snow showers",
        95 | 96 | 99 => "Thunderstorm",
        _ => "Unknown",
    }
}
