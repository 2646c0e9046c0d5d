fn main() {
    selrule::cli::run();
}
