// Integration tests

mod checkout_test;
mod reconciliation_test;
mod routes_test;
