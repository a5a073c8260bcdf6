pub const API_THERMOSTATS: &str = "/api/thermostats";
pub const API_THERMOSTAT: &str = "/api/thermostats/{uuid}";
pub const API_UPDATE: &str = "/api/update";
pub const API_REPORT: &str = "/api/report";

pub const SIM_HVAC: &str = "/hvac";
pub const SIM_TEMPERATURE: &str = "/temperature";
