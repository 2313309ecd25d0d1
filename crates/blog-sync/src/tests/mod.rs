mod synchronizer_tests;
