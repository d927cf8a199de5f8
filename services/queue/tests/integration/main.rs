mod delivery_test;
mod lease_test;
