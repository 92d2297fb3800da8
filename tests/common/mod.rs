#![allow(dead_code)]

pub const BULK_PATH: &str = "/climate_data/bulk_data_e.html";

const INVENTORY_HEADER: &str = "\"Name\",\"Province\",\"Climate ID\",\"Station ID\",\"WMO ID\",\"TC ID\",\"Latitude (Decimal Degrees)\",\"Longitude (Decimal Degrees)\",\"Latitude\",\"Longitude\",\"Elevation (m)\",\"First Year\",\"Last Year\",\"HLY First Year\",\"HLY Last Year\",\"DLY First Year\",\"DLY Last Year\",\"MLY First Year\",\"MLY Last Year\"";

/// Year bounds as they appear in the inventory; empty strings mean no data.
pub struct Ranges<'a> {
    pub overall: (&'a str, &'a str),
    pub hourly: (&'a str, &'a str),
    pub daily: (&'a str, &'a str),
    pub monthly: (&'a str, &'a str),
}

pub fn station_row(name: &str, station_id: &str, lat: f64, long: f64, r: Ranges<'_>) -> String {
    format!(
        "\"{}\",\"ONTARIO\",\"6100000\",\"{}\",\"\",\"\",{},{},0,0,100.0,\"{}\",\"{}\",\"{}\",\"{}\",\"{}\",\"{}\",\"{}\",\"{}\"",
        name,
        station_id,
        lat,
        long,
        r.overall.0,
        r.overall.1,
        r.hourly.0,
        r.hourly.1,
        r.daily.0,
        r.daily.1,
        r.monthly.0,
        r.monthly.1
    )
}

pub fn inventory_text(rows: &[String]) -> String {
    let mut text = String::from(
        "Modified Date: 2019-01-08 23:30 UTC\n\
         \"Disclaimer: The station list is updated daily.\"\n\
         \"Some stations may not report every element.\"\n",
    );
    text.push_str(INVENTORY_HEADER);
    text.push('\n');
    for row in rows {
        text.push_str(row);
        text.push('\n');
    }
    text
}

const PREAMBLE: &str = "\"Station Name\",\"TORONTO\"\n\
                        \"Province\",\"ONTARIO\"\n\
                        \"Latitude\",\"43.67\"\n\
                        \"Longitude\",\"-79.40\"\n\
                        \"\"\n\
                        \"Legend\"\n\
                        \"T\",\"Trace\"\n\
                        \"\"\n";

pub fn monthly_body(rows: &[(&str, &str, &str)]) -> String {
    let mut body = String::from(PREAMBLE);
    body.push_str("\"Date/Time\",\"Year\",\"Month\",\"Mean Max Temp (°C)\",\"Mean Temp (°C)\",\"Mean Temp Flag\",\"Total Precip (mm)\",\"Total Precip Flag\"\n");
    for (ts, temp, precip) in rows {
        body.push_str(&format!(
            "\"{}\",\"{}\",\"{}\",\"\",\"{}\",\"\",\"{}\",\"\"\n",
            ts,
            &ts[..4],
            &ts[5..7],
            temp,
            precip
        ));
    }
    body
}

pub fn daily_body(rows: &[(&str, &str, &str)]) -> String {
    let mut body = String::from(PREAMBLE);
    body.push_str("\"Date/Time\",\"Year\",\"Month\",\"Day\",\"Data Quality\",\"Max Temp (°C)\",\"Min Temp (°C)\",\"Mean Temp (°C)\",\"Total Precip (mm)\"\n");
    for (ts, temp, precip) in rows {
        body.push_str(&format!(
            "\"{}\",\"{}\",\"{}\",\"{}\",\"\",\"\",\"\",\"{}\",\"{}\"\n",
            ts,
            &ts[..4],
            &ts[5..7],
            &ts[8..10],
            temp,
            precip
        ));
    }
    body
}

pub fn hourly_body(rows: &[(&str, &str)]) -> String {
    let mut body = String::from(PREAMBLE);
    body.push_str("\"Date/Time\",\"Year\",\"Month\",\"Day\",\"Time\",\"Temp (°C)\",\"Temp Flag\",\"Dew Point Temp (°C)\"\n");
    for (ts, temp) in rows {
        body.push_str(&format!(
            "\"{}\",\"{}\",\"{}\",\"{}\",\"{}\",\"{}\",\"\",\"\"\n",
            ts,
            &ts[..4],
            &ts[5..7],
            &ts[8..10],
            &ts[11..],
            temp
        ));
    }
    body
}
