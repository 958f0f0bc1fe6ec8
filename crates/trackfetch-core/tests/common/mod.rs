#![allow(dead_code)]

pub mod peer_server;
