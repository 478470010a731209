fn main() {
    imu_timesync::cli::run();
}
