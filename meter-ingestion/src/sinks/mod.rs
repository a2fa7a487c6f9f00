pub mod daily_file;
pub mod mysql;

pub use daily_file::DailyFileLog;
pub use mysql::MySqlGateway;
