mod integration {
    mod cli_tests;
    mod config_tests;
    mod duplicate_tests;
    mod filelist_tests;
    mod transfer_tests;
}
