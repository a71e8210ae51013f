//! Background maintenance jobs, scheduled externally (cron / k8s CronJob)

pub mod cleanup;
