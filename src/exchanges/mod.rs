pub mod zaif;
