//! End-to-end venue requests through a memory broker

mod service;
