mod snapshot_stats;
