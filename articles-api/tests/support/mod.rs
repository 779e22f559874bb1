pub mod test_app;
