//! Property tests for retention selection and the encryption envelope.

mod envelope_props;
mod retention_props;
