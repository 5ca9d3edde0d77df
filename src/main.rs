fn main() -> anyhow::Result<()> {
    morphfield::run()
}
