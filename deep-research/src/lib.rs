// Research pipeline module
pub mod research;

// Shared batch/task/structured-output utilities
pub mod workflow_utils;

// HTTP collaborators for the binary
pub mod providers;
