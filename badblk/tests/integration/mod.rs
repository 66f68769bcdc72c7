// vim: tw=80
//! Integration tests: run the badblk binary against fake sysfs and procfs trees
